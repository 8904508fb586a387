//! Flesch-Kincaid grade level for plain-language answers.

/// Answers shorter than this are not scored.
pub const MIN_SCORABLE_WORDS: usize = 10;

/// Target reading grade band for consent form text, inclusive.
pub const TARGET_GRADE: std::ops::RangeInclusive<f64> = 6.0..=8.0;

/// Vowel-group syllable estimate with a silent trailing `e`.
pub fn count_syllables(word: &str) -> usize {
    let word: String = word
        .chars()
        .filter(|c| c.is_ascii_alphabetic())
        .map(|c| c.to_ascii_lowercase())
        .collect();
    if word.is_empty() {
        return 1;
    }

    let is_vowel = |c: char| matches!(c, 'a' | 'e' | 'i' | 'o' | 'u' | 'y');

    let mut count = 0;
    let mut previous_vowel = false;
    for c in word.chars() {
        let vowel = is_vowel(c);
        if vowel && !previous_vowel {
            count += 1;
        }
        previous_vowel = vowel;
    }

    if count > 1 && word.ends_with('e') && !word.ends_with("le") {
        count -= 1;
    }

    count.max(1)
}

fn words(text: &str) -> Vec<&str> {
    text.split_whitespace()
        .filter(|w| w.chars().any(|c| c.is_alphanumeric()))
        .collect()
}

/// Words whose trailing period does not end a sentence.
const ABBREVIATIONS: [&str; 11] = [
    "dr", "mr", "mrs", "ms", "prof", "st", "vs", "e.g", "i.e", "approx", "fig",
];

fn ends_sentence(token: &str) -> bool {
    let token = token.trim_end_matches(['"', '\'', ')', ']', '\u{201d}', '\u{2019}']);
    if !token.ends_with(['.', '!', '?']) {
        return false;
    }

    let stem = token.trim_end_matches(['.', '!', '?']).to_lowercase();
    let stem = stem.trim_start_matches(['"', '\'', '(', '[', '\u{201c}', '\u{2018}']);
    !(token.ends_with('.') && ABBREVIATIONS.contains(&stem))
}

/// Sentences end at a terminator followed by whitespace or the end of the
/// text, so decimals like `2.5` never split one.
fn sentence_count(text: &str) -> usize {
    let tokens: Vec<&str> = text.split_whitespace().collect();
    match tokens.split_last() {
        // The final fragment is a sentence with or without punctuation
        Some((_, rest)) => rest.iter().filter(|t| ends_sentence(t)).count() + 1,
        None => 1,
    }
}

/// Flesch-Kincaid grade level, or `None` below [`MIN_SCORABLE_WORDS`].
pub fn flesch_kincaid_grade(text: &str) -> Option<f64> {
    let words = words(text);
    if words.len() < MIN_SCORABLE_WORDS {
        return None;
    }

    let word_count = words.len() as f64;
    let sentences = sentence_count(text) as f64;
    let syllables: usize = words.iter().map(|w| count_syllables(w)).sum();

    let grade = 0.39 * (word_count / sentences) + 11.8 * (syllables as f64 / word_count) - 15.59;
    Some((grade * 10.0).round() / 10.0)
}

/// True if `grade` lies inside [`TARGET_GRADE`].
pub fn within_target(grade: f64) -> bool {
    TARGET_GRADE.contains(&grade)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_count_syllables() {
        assert_eq!(count_syllables("cat"), 1);
        assert_eq!(count_syllables("take"), 1);
        assert_eq!(count_syllables("table"), 2);
        assert_eq!(count_syllables("study"), 2);
        assert_eq!(count_syllables("medicine"), 3);
        assert_eq!(count_syllables("21"), 1);
        assert_eq!(count_syllables("the"), 1);
    }

    #[test]
    fn test_simple_text_scores_low() {
        let text = "The cat sat on the mat. The dog ran to the park. We had fun.";
        let grade = flesch_kincaid_grade(text).unwrap();
        assert!(grade < 6.0, "grade was {grade}");
    }

    #[test]
    fn test_dense_text_scores_high() {
        let text = "Pharmacokinetic characterization necessitates comprehensive longitudinal \
                    evaluation of investigational therapeutics administered intravenously \
                    throughout participation.";
        let grade = flesch_kincaid_grade(text).unwrap();
        assert!(grade > 8.0, "grade was {grade}");
        assert!(!within_target(grade));
    }

    #[test]
    fn test_short_text_is_not_scored() {
        assert_eq!(flesch_kincaid_grade("Take the pill."), None);
        assert_eq!(flesch_kincaid_grade(""), None);
    }

    #[test]
    fn test_sentence_count() {
        assert_eq!(sentence_count("One. Two! Three?"), 3);
        assert_eq!(sentence_count("Wait... what"), 2);
        assert_eq!(sentence_count("no punctuation"), 1);
        assert_eq!(sentence_count("Ends with a dot."), 1);
    }

    #[test]
    fn test_decimals_and_abbreviations_do_not_split_sentences() {
        assert_eq!(sentence_count("You will take 2.5 mg of drug X each day."), 1);
        assert_eq!(
            sentence_count("Dr. Smith will see you, e.g. at week 3. Bring your pills."),
            2
        );
        assert_eq!(sentence_count("Call the team (see page 4.) before the visit."), 2);
    }

    #[test]
    fn test_decimal_doses_do_not_lower_the_grade() {
        let plain = "You will take 25 mg of the drug each day for three weeks at home.";
        let dosed = "You will take 2.5 mg of the drug each day for three weeks at home.";
        assert_eq!(flesch_kincaid_grade(plain), flesch_kincaid_grade(dosed));
    }
}
