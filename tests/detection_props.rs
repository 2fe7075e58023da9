use codebridge::looks_interactive;
use proptest::prelude::*;

fn mixed_case(word: &str, mask: &[bool]) -> String {
    word.chars()
        .zip(mask.iter().cycle())
        .map(|(c, upper)| if *upper { c.to_ascii_uppercase() } else { c })
        .collect()
}

proptest! {
    #[test]
    fn calls_are_detected_in_any_case_and_spacing(
        prefix in "[a-z0-9 =\n]{0,20}",
        mask in prop::collection::vec(any::<bool>(), 5),
        raw in any::<bool>(),
        spaces in " {0,4}",
        suffix in "[a-z0-9 ')\n]{0,20}",
    ) {
        let name = if raw { "raw_input" } else { "input" };
        let source = format!("{prefix}\nx = {}{spaces}({suffix}", mixed_case(name, &mask));
        prop_assert!(looks_interactive(&source));
    }

    #[test]
    fn sources_without_the_word_are_batch(source in "[a-hj-zA-HJ-Z0-9_ =()'\"\n#.]{0,200}") {
        prop_assert!(!looks_interactive(&source));
    }

    #[test]
    fn identifier_suffixes_are_not_calls(stem in "[a-z_]{1,8}") {
        prop_assume!(!stem.ends_with("raw_"));
        let source = format!("{stem}input(1)\nvalue = {stem}_input");
        prop_assert!(!looks_interactive(&source));
    }

    #[test]
    fn detection_is_deterministic(source in "\\PC{0,120}") {
        prop_assert_eq!(looks_interactive(&source), looks_interactive(&source));
    }
}
