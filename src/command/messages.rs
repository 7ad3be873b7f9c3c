//! Operator-facing text
//!
//! Downstream tooling scrapes these strings, so the wording is fixed.

pub const DISALLOWED_COMMAND: &str = "Disallowed command";

pub const MISSING_IDENTITY: &str = "Failed to get key id";

pub const ACCESS_DENIED: &str = "Access denied";

pub const TWO_FACTOR_QUESTION: &str = "Are you sure you want to generate new two-factor recovery codes?\n\
Any existing recovery codes you saved will be invalidated. (yes/no)";

pub const TWO_FACTOR_DECLINED: &str =
    "New recovery codes have *not* been generated. Existing codes will remain valid.";

pub const TWO_FACTOR_SUCCESS_HEADER: &str = "Your two-factor authentication recovery codes are:";

pub const TWO_FACTOR_GUIDANCE: &str = "During sign in, use one of the codes above when prompted for\n\
your two-factor code. Then, visit your Profile Settings and add\n\
a new device so you do not lose access to your account again.";

pub const TWO_FACTOR_ERROR_HEADER: &str =
    "An error occurred while trying to generate new recovery codes.";

pub const TOKEN_CREATION_FAILED: &str = "Failed to create personal access token";

pub const WELCOME_ANONYMOUS: &str = "Welcome to GitLab, Anonymous!";

pub fn welcome(username: &str) -> String {
    format!("Welcome to GitLab, @{}!", username)
}

pub fn unknown_lfs_operation(operation: &str) -> String {
    format!("Unknown operation \"{}\"", operation)
}

pub fn invalid_ttl(value: &str) -> String {
    format!("Invalid value for days_ttl: '{}'", value)
}

/// Success block: header, one code per line, guidance
pub fn recovery_codes(codes: &[String]) -> String {
    format!(
        "\n{}\n\n{}\n\n{}\n",
        TWO_FACTOR_SUCCESS_HEADER,
        codes.join("\n"),
        TWO_FACTOR_GUIDANCE
    )
}

/// Failure block: header then the detail line, which may be empty
pub fn recovery_codes_error(detail: &str) -> String {
    format!("\n{}\n{}\n", TWO_FACTOR_ERROR_HEADER, detail)
}

pub fn recovery_codes_declined() -> String {
    format!("\n{}\n", TWO_FACTOR_DECLINED)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_question_is_two_lines() {
        assert_eq!(TWO_FACTOR_QUESTION.lines().count(), 2);
        assert!(TWO_FACTOR_QUESTION.ends_with("(yes/no)"));
    }

    #[test]
    fn test_recovery_codes_layout() {
        let codes = vec!["recovery".to_string(), "codes".to_string()];
        let text = recovery_codes(&codes);
        assert!(text.starts_with("\nYour two-factor authentication recovery codes are:\n\n"));
        assert!(text.contains("\nrecovery\ncodes\n\nDuring sign in"));
        assert!(text.ends_with("lose access to your account again.\n"));
    }

    #[test]
    fn test_error_without_detail() {
        assert_eq!(
            recovery_codes_error(""),
            "\nAn error occurred while trying to generate new recovery codes.\n\n"
        );
    }

    #[test]
    fn test_welcome() {
        assert_eq!(welcome("alice"), "Welcome to GitLab, @alice!");
    }
}
