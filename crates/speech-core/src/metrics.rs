/// Edit distance between two token sequences.
pub fn levenshtein<T: PartialEq>(reference: &[T], hypothesis: &[T]) -> usize {
    let mut previous: Vec<usize> = (0..=hypothesis.len()).collect();
    let mut current = vec![0; hypothesis.len() + 1];

    for (i, r) in reference.iter().enumerate() {
        current[0] = i + 1;
        for (j, h) in hypothesis.iter().enumerate() {
            let substitution = previous[j] + usize::from(r != h);
            current[j + 1] = substitution.min(previous[j + 1] + 1).min(current[j] + 1);
        }
        std::mem::swap(&mut previous, &mut current);
    }

    previous[hypothesis.len()]
}

fn error_rate(errors: usize, reference_len: usize) -> f64 {
    if reference_len == 0 {
        return if errors == 0 { 0.0 } else { 1.0 };
    }
    errors as f64 / reference_len as f64
}

/// Word error rate. An empty reference scores 0 against an empty hypothesis and 1 otherwise.
pub fn wer(reference: &str, hypothesis: &str) -> f64 {
    let reference: Vec<&str> = reference.split_whitespace().collect();
    let hypothesis: Vec<&str> = hypothesis.split_whitespace().collect();
    error_rate(levenshtein(&reference, &hypothesis), reference.len())
}

/// Character error rate over whitespace-normalized text.
pub fn cer(reference: &str, hypothesis: &str) -> f64 {
    let normalize = |s: &str| -> Vec<char> {
        s.split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .chars()
            .collect()
    };
    let reference = normalize(reference);
    let hypothesis = normalize(hypothesis);
    error_rate(levenshtein(&reference, &hypothesis), reference.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levenshtein_counts_edits() {
        let kitten = ['k', 'i', 't', 't', 'e', 'n'];
        let sitting = ['s', 'i', 't', 't', 'i', 'n', 'g'];
        assert_eq!(levenshtein(&kitten, &sitting), 3);
        assert_eq!(levenshtein::<u8>(&[], &[1, 2]), 2);
    }

    #[test]
    fn wer_on_known_sentences() {
        assert_eq!(wer("the cat sat", "the cat sat"), 0.0);
        assert!((wer("the cat sat on the mat", "the cat sit on mat") - 2.0 / 6.0).abs() < 1e-9);
        assert_eq!(wer("hello", "hello world again"), 2.0);
    }

    #[test]
    fn cer_ignores_extra_whitespace() {
        assert_eq!(cer("a  b", "a b"), 0.0);
        assert!((cer("abcd", "abed") - 0.25).abs() < 1e-9);
    }

    #[test]
    fn empty_reference() {
        assert_eq!(wer("", ""), 0.0);
        assert_eq!(wer("", "noise"), 1.0);
        assert_eq!(cer("   ", "x"), 1.0);
    }
}
