/// Ask whether two entity names denote the same thing.
#[must_use]
pub fn confirmation_prompt(entity_type: &str, first: &str, second: &str) -> String {
    format!(
        "Do these two {entity_type} entities refer to the same real-world thing?\n\
         A: \"{first}\"\n\
         B: \"{second}\"\n\
         Answer with exactly one word: YES or NO."
    )
}

/// `true` when the reply starts with YES (any case, surrounding noise ignored).
#[must_use]
pub fn is_confirmed(reply: &str) -> bool {
    reply
        .trim_start_matches(|c: char| !c.is_alphanumeric())
        .get(..3)
        .is_some_and(|head| head.eq_ignore_ascii_case("yes"))
}
