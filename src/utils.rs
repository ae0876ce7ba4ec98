const SUBSCRIPT_DIGITS: [char; 10] = ['₀', '₁', '₂', '₃', '₄', '₅', '₆', '₇', '₈', '₉'];

fn to_unicode(number: usize, digits: &[char; 10]) -> String {
    if number == 0 {
        return digits[0].to_string();
    }
    let mut num = number;
    let mut digit_stack = Vec::new();
    while num != 0 {
        digit_stack.push(digits[num % 10]);
        num /= 10;
    }
    digit_stack.drain(..).rev().collect()
}

/// Renders `number` with unicode subscript digits, used to extend index alphabets.
pub fn to_subscript(number: usize) -> String {
    to_unicode(number, &SUBSCRIPT_DIGITS)
}

/// Parity of the permutation that sorts `keys` (stable), as the number of inversions mod 2.
///
/// Returns `true` for an odd permutation.
pub fn inversion_parity<T: Ord>(keys: &[T]) -> bool {
    let mut odd = false;
    for (i, a) in keys.iter().enumerate() {
        for b in &keys[i + 1..] {
            if a > b {
                odd = !odd;
            }
        }
    }
    odd
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscripts() {
        assert_eq!(to_subscript(0), "₀");
        assert_eq!(to_subscript(12), "₁₂");
    }

    #[test]
    fn parity() {
        assert!(!inversion_parity(&[0, 1, 2, 3]));
        assert!(inversion_parity(&[1, 0, 2, 3]));
        assert!(!inversion_parity(&[0, 3, 1, 2]));
        assert!(inversion_parity(&[0, 2, 1, 3]));
    }
}
