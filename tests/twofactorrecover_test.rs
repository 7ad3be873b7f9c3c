//! Two-factor recovery code transcripts against a mock internal API

mod support;

use git_shell_gateway::cli::ExitCode;
use git_shell_gateway::command::twofactorrecover::Command;
use git_shell_gateway::command::{ActorIdentity, ReadWriter};
use support::{MockApi, RecordedRequest};

const QUESTION: &str = "Are you sure you want to generate new two-factor recovery codes?\n\
Any existing recovery codes you saved will be invalidated. (yes/no)\n\n";

fn recovery_codes_handler(req: &RecordedRequest) -> (u16, String) {
    assert_eq!(req.path, "/api/v4/internal/two_factor_recovery_codes");
    assert_eq!(req.method, "POST");

    match req.body["key_id"].as_str() {
        Some("1") => (
            200,
            r#"{"success":true,"recovery_codes":["recovery","codes"]}"#.to_string(),
        ),
        Some("broken_message") => (200, r#"{"success":false,"message":"Forbidden!"}"#.to_string()),
        Some("broken") => (500, String::new()),
        _ => (200, "null".to_string()),
    }
}

async fn execute(api: &MockApi, key_id: &str, answer: &str) -> (ExitCode, String) {
    let client = api.client();
    let identity = ActorIdentity::key_id(key_id);
    let mut out = Vec::new();
    let mut err = Vec::new();

    let code = {
        let mut rw = ReadWriter::new(answer.as_bytes(), &mut out, &mut err);
        Command::new(&client, identity.as_ref())
            .execute(&mut rw)
            .await
            .unwrap()
    };
    assert!(err.is_empty());
    (code, String::from_utf8(out).unwrap())
}

#[tokio::test]
async fn test_known_key_id() {
    let api = MockApi::start(recovery_codes_handler).await;
    let (code, output) = execute(&api, "1", "yes\n").await;

    assert_eq!(code, ExitCode::Success);
    assert_eq!(
        output,
        format!(
            "{}{}",
            QUESTION,
            "Your two-factor authentication recovery codes are:\n\nrecovery\ncodes\n\n\
During sign in, use one of the codes above when prompted for\n\
your two-factor code. Then, visit your Profile Settings and add\n\
a new device so you do not lose access to your account again.\n"
        )
    );
}

#[tokio::test]
async fn test_unknown_key_id() {
    let api = MockApi::start(recovery_codes_handler).await;
    let (code, output) = execute(&api, "-1", "yes\n").await;

    assert_eq!(code, ExitCode::Failure);
    assert_eq!(
        output,
        format!(
            "{}An error occurred while trying to generate new recovery codes.\n\n",
            QUESTION
        )
    );
}

#[tokio::test]
async fn test_api_returns_error_message() {
    let api = MockApi::start(recovery_codes_handler).await;
    let (_, output) = execute(&api, "broken_message", "yes\n").await;

    assert_eq!(
        output,
        format!(
            "{}An error occurred while trying to generate new recovery codes.\nForbidden!\n",
            QUESTION
        )
    );
}

#[tokio::test]
async fn test_api_fails() {
    let api = MockApi::start(recovery_codes_handler).await;
    let (code, output) = execute(&api, "broken", "yes\n").await;

    assert_eq!(code, ExitCode::Failure);
    assert_eq!(
        output,
        format!(
            "{}An error occurred while trying to generate new recovery codes.\nInternal API error (500)\n",
            QUESTION
        )
    );
}

#[tokio::test]
async fn test_missing_identity_never_calls_api() {
    let api = MockApi::start(recovery_codes_handler).await;
    let (code, output) = execute(&api, "", "yes\n").await;

    assert_eq!(code, ExitCode::Failure);
    assert_eq!(
        output,
        format!(
            "{}An error occurred while trying to generate new recovery codes.\nFailed to get key id\n",
            QUESTION
        )
    );
    assert_eq!(api.hits(), 0);
}

#[tokio::test]
async fn test_negative_answer_never_calls_api() {
    let api = MockApi::start(|_: &RecordedRequest| panic!("API must not be called")).await;

    for answer in ["no\n", "\n", "YES\n", ""] {
        let (code, output) = execute(&api, "1", answer).await;
        assert_eq!(code, ExitCode::Success);
        assert_eq!(
            output,
            format!(
                "{}New recovery codes have *not* been generated. Existing codes will remain valid.\n",
                QUESTION
            )
        );
    }
    assert_eq!(api.hits(), 0);
}

#[tokio::test]
async fn test_unreachable_api() {
    let api = MockApi::start(recovery_codes_handler).await;
    let mut config = api.config();
    config.gitlab_url = format!("http+unix://{}.missing", api.socket.display());
    let client = git_shell_gateway::api::ApiClient::new(&config).unwrap();
    let identity = ActorIdentity::KeyId("1".to_string());

    let mut out = Vec::new();
    let mut err = Vec::new();
    let code = {
        let mut rw = ReadWriter::new(&b"yes\n"[..], &mut out, &mut err);
        Command::new(&client, Some(&identity))
            .execute(&mut rw)
            .await
            .unwrap()
    };

    assert_eq!(code, ExitCode::Failure);
    assert!(
        String::from_utf8(out)
            .unwrap()
            .ends_with("recovery codes.\nInternal API unreachable\n")
    );
}

#[tokio::test]
async fn test_dispatched_through_ssh_command() {
    let api = MockApi::start(recovery_codes_handler).await;
    let outcome = support::run(api.config(), "key-1", "2fa_recovery_codes", "yes\n").await;

    assert_eq!(outcome.code, ExitCode::Success);
    assert!(outcome.out.contains("\nrecovery\ncodes\n"));
    assert_eq!(api.requests()[0].body["key_id"], "1");
}
