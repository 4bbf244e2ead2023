/// Best-path CTC decoding over per-frame argmax ids: merge repeats, then drop blanks.
pub fn greedy_decode(frames: &[i64], blank: i64) -> Vec<i64> {
    let mut decoded = Vec::new();
    let mut previous = None;
    for &id in frames {
        if previous != Some(id) && id != blank {
            decoded.push(id);
        }
        previous = Some(id);
    }
    decoded
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collapses_repeats_and_blanks() {
        assert_eq!(greedy_decode(&[5, 5, 28, 5, 7, 7, 28, 28], 28), vec![5, 5, 7]);
    }

    #[test]
    fn all_blank_is_empty() {
        assert!(greedy_decode(&[28, 28, 28], 28).is_empty());
        assert!(greedy_decode(&[], 28).is_empty());
    }
}
