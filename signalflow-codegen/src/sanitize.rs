//! C99 identifier hygiene for names coming from the model.

/// Keywords of C99 (§6.4.1). An identifier landing on one gets a trailing
/// underscore.
const C99_KEYWORDS: &[&str] = &[
    "auto", "break", "case", "char", "const", "continue", "default", "do", "double", "else",
    "enum", "extern", "float", "for", "goto", "if", "inline", "int", "long", "register",
    "restrict", "return", "short", "signed", "sizeof", "static", "struct", "switch", "typedef",
    "union", "unsigned", "void", "volatile", "while", "_Bool", "_Complex", "_Imaginary",
    // not keywords, but stdbool.h macros that behave like them here
    "bool", "true", "false",
];

/// Turns an arbitrary model name into a valid C99 identifier: characters
/// outside `[A-Za-z0-9_]` become `_`, a leading digit gets a `_` prefix,
/// and keywords get a `_` suffix.
pub fn sanitize_identifier(name: &str) -> String {
    let mut out: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if out.is_empty() {
        out.push('_');
    }
    if out.chars().next().is_some_and(|c| c.is_ascii_digit()) {
        out.insert(0, '_');
    }
    if C99_KEYWORDS.contains(&out.as_str()) {
        out.push('_');
    }
    out
}

/// Uppercased include-guard symbol for a model name.
pub fn include_guard(model_name: &str) -> String {
    let mut out: String = model_name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect();
    if out.chars().next().is_some_and(|c| c.is_ascii_digit()) {
        out.insert(0, '_');
    }
    format!("{out}_H")
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("123invalid", "_123invalid")]
    #[case("int", "int_")]
    #[case("C++", "C__")]
    #[case("my block", "my_block")]
    #[case("ok_name", "ok_name")]
    #[case("été", "___")]
    #[case("", "_")]
    #[case("double", "double_")]
    #[case("true", "true_")]
    fn test_sanitize(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(sanitize_identifier(input), expected);
    }

    #[test]
    fn test_include_guard() {
        assert_eq!(include_guard("My Model-2"), "MY_MODEL_2_H");
        assert_eq!(include_guard("9lives"), "_9LIVES_H");
    }
}
