//! Command execution through the RPC shim
//!
//! `exec` sends one lncli subcommand to the node and retries until the shim
//! prints a JSON record or the attempt budget runs out.

use super::handle::LndNode;
use super::runner::CommandOutput;
use crate::error::{AttemptError, NodeError, NodeResult};
use serde_json::Value;

impl LndNode {
    /// Run an lncli subcommand (with its arguments) against this node.
    ///
    /// The command is split with shell quoting rules, so
    /// `addinvoice --memo "coffee run" 1000` sends the memo as one argument.
    pub async fn exec(&self, command: &str) -> NodeResult<Value> {
        let parts = shell_words::split(command)
            .map_err(|e| NodeError::InvalidCommand(format!("{}: {}", command.trim(), e)))?;
        self.exec_args(&parts).await
    }

    /// Run an lncli subcommand given as separate arguments.
    ///
    /// Attempts run strictly one after another. The first attempt that yields
    /// a JSON record wins; if every attempt fails the last failure is
    /// reported.
    pub async fn exec_args<S>(&self, command: &[S]) -> NodeResult<Value>
    where
        S: AsRef<str> + Sync,
    {
        let parts: Vec<&str> = command.iter().map(AsRef::as_ref).collect();
        if parts.first().map_or(true, |name| name.trim().is_empty()) {
            return Err(NodeError::InvalidCommand(
                "command must not be empty".to_string(),
            ));
        }

        let policy = self.retry_policy();
        let attempts = policy.attempts();
        let mut attempt = 1;
        loop {
            let err = match self.attempt(&parts).await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            if attempt >= attempts {
                return Err(NodeError::RpcExhausted {
                    command: shell_words::join(&parts),
                    attempts,
                    last: err,
                });
            }

            log::log!(
                self.diag_level(),
                "{}: `{}` attempt {}/{} failed: {}",
                self.name(),
                parts[0],
                attempt,
                attempts,
                err
            );
            if !policy.wait(attempt, self.cancellation()).await {
                return Err(NodeError::Cancelled(self.name().to_string()));
            }
            attempt += 1;
        }
    }

    async fn attempt(&self, parts: &[&str]) -> Result<Value, AttemptError> {
        let invocation = self.shim_invocation(parts);
        let output = self
            .runner()
            .run(&invocation)
            .await
            .map_err(AttemptError::Spawn)?;
        classify(output)
    }
}

fn classify(output: CommandOutput) -> Result<Value, AttemptError> {
    if !output.success() {
        return Err(AttemptError::ExitStatus {
            code: output.code,
            stderr: output.stderr.trim().to_string(),
        });
    }

    let stdout = output.stdout.trim();
    let stderr = output.stderr.trim();
    if !stdout.is_empty() {
        parse_output(stdout)
    } else if !stderr.is_empty() {
        Err(AttemptError::Connection(stderr.to_string()))
    } else {
        Err(AttemptError::NoResponse)
    }
}

/// Parse the first JSON record printed by the shim
pub fn parse_output(stdout: &str) -> Result<Value, AttemptError> {
    serde_json::Deserializer::from_str(stdout)
        .into_iter::<Value>()
        .next()
        .unwrap_or_else(|| Err(<serde_json::Error as serde::de::Error>::custom("empty output")))
        .map_err(|e| AttemptError::Parse(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::config::{NodeConfig, NodeOptions};
    use crate::node::retry::RetryPolicy;
    use crate::node::testing::{exit, ok, output, spawn_error, ScriptedRunner};
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;

    fn node(runner: Arc<ScriptedRunner>) -> LndNode {
        let config = NodeConfig::new(NodeOptions::new("alice", 10001, 10011)).unwrap();
        LndNode::new(config, runner).with_retry_policy(RetryPolicy::immediate(5))
    }

    #[tokio::test]
    async fn test_first_success_returns_immediately() {
        let runner = Arc::new(ScriptedRunner::new());
        runner.push(ok(r#"{"block_height": 101}"#));
        let node = node(runner.clone());

        let value = node.exec("getinfo").await.unwrap();
        assert_eq!(value, json!({"block_height": 101}));
        assert_eq!(runner.invocations().len(), 1);
    }

    #[tokio::test]
    async fn test_succeeds_on_third_attempt() {
        let runner = Arc::new(ScriptedRunner::new());
        runner.push(Ok(output(Some(0), "", "rpc error: connection refused")));
        runner.push(Ok(output(Some(0), "", "")));
        runner.push(ok(r#"{"attempt": 3}"#));
        runner.push(ok(r#"{"attempt": 4}"#));
        let node = node(runner.clone());

        let value = node.exec("walletbalance").await.unwrap();
        assert_eq!(value["attempt"], 3);
        assert_eq!(runner.invocations().len(), 3);
    }

    #[tokio::test]
    async fn test_exhaustion_surfaces_last_error() {
        let runner = Arc::new(ScriptedRunner::new());
        for i in 1..=5 {
            runner.push(Ok(output(Some(0), "", &format!("failure {}", i))));
        }
        let node = node(runner.clone());

        match node.exec("getinfo").await {
            Err(NodeError::RpcExhausted {
                command,
                attempts,
                last,
            }) => {
                assert_eq!(command, "getinfo");
                assert_eq!(attempts, 5);
                assert_eq!(last, AttemptError::Connection("failure 5".to_string()));
            }
            other => panic!("expected exhaustion, got {:?}", other),
        }
        assert_eq!(runner.invocations().len(), 5);
    }

    #[tokio::test]
    async fn test_blank_command_rejected_before_running() {
        let runner = Arc::new(ScriptedRunner::new());
        let node = node(runner.clone());
        assert!(matches!(
            node.exec("   ").await,
            Err(NodeError::InvalidCommand(_))
        ));
        assert!(runner.invocations().is_empty());
    }

    #[tokio::test]
    async fn test_execution_errors_are_retried() {
        let runner = Arc::new(ScriptedRunner::new());
        runner.push(spawn_error("docker: not found"));
        runner.push(exit(1, "container alice is not running"));
        runner.push(ok("not json"));
        runner.push(ok(r#"{"peers": []}"#));
        let node = node(runner.clone());

        let value = node.exec("listpeers").await.unwrap();
        assert_eq!(value, json!({"peers": []}));
        assert_eq!(runner.invocations().len(), 4);
    }

    #[tokio::test]
    async fn test_command_arguments_are_split() {
        let runner = Arc::new(ScriptedRunner::new());
        runner.push(ok(r#"{"address": "2N..."}"#));
        let node = node(runner.clone());

        node.exec("newaddress   np2wkh").await.unwrap();
        let calls = runner.invocations();
        let args = &calls[0].args;
        assert_eq!(&args[args.len() - 2..], &["newaddress", "np2wkh"]);
    }

    #[tokio::test]
    async fn test_quoted_argument_stays_whole() {
        let runner = Arc::new(ScriptedRunner::new());
        runner.push(ok(r#"{"payment_request": "lnbc..."}"#));
        let node = node(runner.clone());

        node.exec(r#"addinvoice --memo "coffee run" 1000"#)
            .await
            .unwrap();
        let calls = runner.invocations();
        let args = &calls[0].args;
        assert_eq!(
            &args[args.len() - 4..],
            &["addinvoice", "--memo", "coffee run", "1000"]
        );
    }

    #[tokio::test]
    async fn test_exec_args_keeps_boundaries() {
        let runner = Arc::new(ScriptedRunner::new());
        runner.push(ok(r#"{"payment_request": "lnbc..."}"#));
        let node = node(runner.clone());

        let command = vec![
            "addinvoice".to_string(),
            "--memo".to_string(),
            "it's late".to_string(),
        ];
        node.exec_args(&command).await.unwrap();
        let calls = runner.invocations();
        let args = &calls[0].args;
        assert_eq!(&args[args.len() - 3..], command.as_slice());
    }

    #[tokio::test]
    async fn test_unbalanced_quote_rejected_before_running() {
        let runner = Arc::new(ScriptedRunner::new());
        let node = node(runner.clone());

        assert!(matches!(
            node.exec(r#"addinvoice --memo "coffee run 1000"#).await,
            Err(NodeError::InvalidCommand(_))
        ));
        assert!(matches!(
            node.exec_args::<&str>(&[]).await,
            Err(NodeError::InvalidCommand(_))
        ));
        assert!(runner.invocations().is_empty());
    }

    #[tokio::test]
    async fn test_exhausted_command_is_requoted() {
        let runner = Arc::new(ScriptedRunner::new());
        let node = LndNode::new(
            NodeConfig::new(NodeOptions::new("alice", 10001, 10011)).unwrap(),
            runner.clone(),
        )
        .with_retry_policy(RetryPolicy::immediate(1));

        match node.exec(r#"addinvoice --memo "coffee run""#).await {
            Err(NodeError::RpcExhausted { command, .. }) => {
                assert_eq!(command, "addinvoice --memo 'coffee run'");
            }
            other => panic!("expected exhaustion, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_cancel_stops_backoff() {
        let runner = Arc::new(ScriptedRunner::new());
        runner.push(Ok(output(Some(0), "", "")));
        let config = NodeConfig::new(NodeOptions::new("alice", 10001, 10011)).unwrap();
        let node = LndNode::new(config, runner.clone()).with_retry_policy(RetryPolicy {
            initial_delay: Duration::from_secs(3600),
            max_delay: Duration::from_secs(3600),
            ..RetryPolicy::default()
        });
        node.cancel();

        assert!(matches!(
            node.exec("getinfo").await,
            Err(NodeError::Cancelled(_))
        ));
        assert_eq!(runner.invocations().len(), 1);
    }

    #[test]
    fn test_parse_output_takes_first_record() {
        let value = parse_output("{\"a\": 1}\n{\"b\": 2}\n").unwrap();
        assert_eq!(value, json!({"a": 1}));
        assert!(matches!(parse_output("[lncli] oops"), Err(AttemptError::Parse(_))));
    }

    #[test]
    fn test_classify_branches() {
        assert_eq!(
            classify(output(Some(0), "", "")),
            Err(AttemptError::NoResponse)
        );
        assert_eq!(
            classify(output(Some(0), "  ", " starting ")),
            Err(AttemptError::Connection("starting".to_string()))
        );
        assert_eq!(
            classify(output(Some(2), "", "boom")),
            Err(AttemptError::ExitStatus {
                code: Some(2),
                stderr: "boom".to_string()
            })
        );
    }
}
