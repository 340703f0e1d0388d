//! Bounded executor for user-authored tool bodies.
//!
//! Tool bodies are rhai scripts evaluated with three ambient bindings:
//! `input` (the parsed tool arguments), `env` (a snapshot of the process
//! environment), and an outbound HTTP capability (`http_get` /
//! `http_post`). Evaluation runs on a blocking thread and is raced
//! against a hard deadline enforced through the engine's progress hook.
//!
//! Failure is data, not control flow: every error path returns a string
//! that is fed back into the model's context. The executor is *bounded*,
//! not *secure* — it trusts agent-authored code with the capabilities it
//! is handed.

use std::sync::OnceLock;
use std::time::{Duration, Instant};

use rhai::{Dynamic, Engine, EvalAltResult, Map, Scope};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const HTTP_TIMEOUT: Duration = Duration::from_secs(25);

fn http_client() -> &'static reqwest::blocking::Client {
    static CLIENT: OnceLock<reqwest::blocking::Client> = OnceLock::new();
    CLIENT.get_or_init(|| {
        reqwest::blocking::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .expect("blocking http client")
    })
}

pub struct Executor {
    timeout: Duration,
}

impl Default for Executor {
    fn default() -> Self {
        Self::new()
    }
}

impl Executor {
    pub fn new() -> Self {
        Self { timeout: DEFAULT_TIMEOUT }
    }

    /// Timeout override, used by tests and diagnostics.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Compile-check a tool body without running it. Meta-tools call this
    /// before persisting model-authored code.
    pub fn check(code: &str) -> std::result::Result<(), String> {
        Engine::new().compile(code).map(|_| ()).map_err(|e| e.to_string())
    }

    /// Run a tool body against the given input. Always returns a string;
    /// compile errors, runtime errors, and timeouts are reported in-band.
    pub async fn execute(&self, code: &str, input: serde_json::Value) -> String {
        let code = code.to_string();
        let timeout = self.timeout;
        let timeout_secs = timeout.as_secs();

        let task = tokio::task::spawn_blocking(move || run_script(&code, input, timeout));

        // The progress hook terminates the script at the deadline; the
        // outer race is a backstop for time spent outside script code
        // (e.g. a blocking HTTP call).
        match tokio::time::timeout(timeout + Duration::from_secs(5), task).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "sandbox worker panicked");
                "Error executing tool: internal execution failure".to_string()
            }
            Err(_) => format!(
                "Error executing tool: Tool execution timed out after {timeout_secs} seconds"
            ),
        }
    }
}

fn run_script(code: &str, input: serde_json::Value, timeout: Duration) -> String {
    let timeout_secs = timeout.as_secs();
    let deadline = Instant::now() + timeout;

    let mut engine = Engine::new();
    engine.on_progress(move |_ops| {
        if Instant::now() >= deadline {
            Some(Dynamic::UNIT)
        } else {
            None
        }
    });
    register_http(&mut engine);

    let ast = match engine.compile(code) {
        Ok(ast) => ast,
        Err(e) => return format!("Error: {e}"),
    };

    let input_dynamic = match rhai::serde::to_dynamic(&input) {
        Ok(d) => d,
        Err(e) => return format!("Error executing tool: invalid input: {e}"),
    };

    let mut scope = Scope::new();
    scope.push_dynamic("input", input_dynamic);
    scope.push("env", env_snapshot());

    match engine.eval_ast_with_scope::<Dynamic>(&mut scope, &ast) {
        Ok(value) => coerce_result(value),
        Err(e) => match *e {
            EvalAltResult::ErrorTerminated(..) => format!(
                "Error executing tool: Tool execution timed out after {timeout_secs} seconds"
            ),
            other => format!("Error executing tool: {other}"),
        },
    }
}

/// Read view of the process environment, snapshotted per invocation so
/// credential writes from the current turn are visible on the next call.
fn env_snapshot() -> Map {
    let mut map = Map::new();
    for (key, value) in std::env::vars() {
        map.insert(key.into(), value.into());
    }
    map
}

fn register_http(engine: &mut Engine) {
    engine.register_fn("http_get", |url: &str| -> String {
        match http_client().get(url).send() {
            Ok(resp) => {
                let status = resp.status();
                match resp.text() {
                    Ok(body) if status.is_success() => body,
                    Ok(body) => format!("HTTP {}: {body}", status.as_u16()),
                    Err(e) => format!("Error: failed to read response body: {e}"),
                }
            }
            Err(e) => format!("Error: request failed: {e}"),
        }
    });

    engine.register_fn("http_post", |url: &str, body: Dynamic| -> String {
        let payload: serde_json::Value = match rhai::serde::from_dynamic(&body) {
            Ok(v) => v,
            Err(e) => return format!("Error: body is not serializable: {e}"),
        };
        match http_client().post(url).json(&payload).send() {
            Ok(resp) => {
                let status = resp.status();
                match resp.text() {
                    Ok(body) if status.is_success() => body,
                    Ok(body) => format!("HTTP {}: {body}", status.as_u16()),
                    Err(e) => format!("Error: failed to read response body: {e}"),
                }
            }
            Err(e) => format!("Error: request failed: {e}"),
        }
    });
}

/// Coerce the script's return value into the string handed to the model.
fn coerce_result(value: Dynamic) -> String {
    if value.is::<()>() {
        return "Tool executed successfully (no return value).".to_string();
    }
    match value.clone().into_string() {
        Ok(s) => s,
        Err(_) => match rhai::serde::from_dynamic::<serde_json::Value>(&value) {
            Ok(json) => serde_json::to_string_pretty(&json).unwrap_or_else(|_| value.to_string()),
            Err(_) => value.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn string_result_passes_through() {
        let executor = Executor::new();
        let result = executor.execute(r#""alice""#, serde_json::json!({})).await;
        assert_eq!(result, "alice");
    }

    #[tokio::test]
    async fn unit_result_reports_success() {
        let executor = Executor::new();
        let result = executor.execute("let x = 1;", serde_json::json!({})).await;
        assert_eq!(result, "Tool executed successfully (no return value).");
    }

    #[tokio::test]
    async fn structured_result_is_pretty_printed() {
        let executor = Executor::new();
        let result = executor
            .execute(r#"#{ name: "alice", count: 2 }"#, serde_json::json!({}))
            .await;
        let parsed: serde_json::Value = serde_json::from_str(&result).unwrap();
        assert_eq!(parsed["name"], "alice");
        assert_eq!(parsed["count"], 2);
    }

    #[tokio::test]
    async fn input_binding_is_visible() {
        let executor = Executor::new();
        let result = executor
            .execute("input.city", serde_json::json!({"city": "Lisbon"}))
            .await;
        assert_eq!(result, "Lisbon");
    }

    #[tokio::test]
    async fn env_binding_reflects_process_environment() {
        std::env::set_var("ENVOY_SANDBOX_TEST_KEY", "sk-test-12345");
        let executor = Executor::new();
        let result = executor
            .execute("env.ENVOY_SANDBOX_TEST_KEY", serde_json::json!({}))
            .await;
        assert_eq!(result, "sk-test-12345");
    }

    #[tokio::test]
    async fn compile_error_is_in_band() {
        let executor = Executor::new();
        let result = executor.execute("let = ;", serde_json::json!({})).await;
        assert!(result.starts_with("Error: "), "got: {result}");
    }

    #[tokio::test]
    async fn runtime_error_is_in_band() {
        let executor = Executor::new();
        let result = executor.execute("1 / 0", serde_json::json!({})).await;
        assert!(result.starts_with("Error executing tool: "), "got: {result}");
    }

    #[tokio::test]
    async fn infinite_loop_hits_timeout() {
        let executor = Executor::with_timeout(Duration::from_millis(200));
        let start = Instant::now();
        let result = executor.execute("loop { }", serde_json::json!({})).await;
        assert!(
            result.starts_with("Error executing tool: Tool execution timed out"),
            "got: {result}"
        );
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn check_accepts_valid_and_rejects_invalid() {
        assert!(Executor::check(r#""ok""#).is_ok());
        assert!(Executor::check("let = ;").is_err());
    }
}
