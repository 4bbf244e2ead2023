use launcher::{run, DeepSpeechRuntime};

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(err) = run(&mut DeepSpeechRuntime, std::env::args_os()) {
        if let Some(usage) = err.downcast_ref::<clap::Error>() {
            usage.exit();
        }
        eprintln!("Error: {:?}", err);
        std::process::exit(1);
    }
}
