//! Interactive chat session.
//!
//! Owns the conversation state: history, the latest retrieval context, the
//! encryption toggle, and the lazily-connected job dispatcher. Each non-command
//! line runs the full pipeline: condense the conversation into a standalone
//! query, dispatch a retrieval job, then stream the answer with the fetched
//! context in the system prompt.
#![allow(clippy::print_stdout)]

use std::io::Write;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info};

use ragchat_core::tracing_init::{self, FilterHandle};
use ragchat_core::{ChatHistory, Config};
use ragchat_proto::{JobInput, JobRequest, KIND_JOB_RAG, ProtoError};
use ragchat_relay::JobDispatcher;

use crate::openai::ChatClient;
use crate::prompts;

/// Expiration horizon on dispatched jobs: one hour.
const JOB_EXPIRY_SECS: u64 = 3600;

/// Filter applied while the debug toggle is on.
const DEBUG_FILTER: &str = "debug";

/// What the loop should do after a line is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoopControl {
    Continue,
    Quit,
}

/// Build the retrieval job request for a query.
///
/// Parameters and the plugin reference come from config; every configured
/// document goes in as a passage input, the query as a text input. `now` is
/// unix seconds, taken as an argument so the expiration is testable.
fn rag_request(
    config: &Config,
    question: &str,
    warm_up: bool,
    now: u64,
) -> Result<JobRequest, ProtoError> {
    let mut request = JobRequest::new(KIND_JOB_RAG)?
        .param("run-on", &config.runtime)
        .param("main", &config.plugin_url)
        .param("k", "3")
        .param("max-tokens", "256")
        .param("quantize", "false")
        .param("warm-up", if warm_up { "true" } else { "false" })
        .param("cache-duration-hint", "-1")
        .expires_at(now + JOB_EXPIRY_SECS);
    for document in &config.documents {
        request = request.input(JobInput::url(document).with_marker("passage"));
    }
    Ok(request.input(JobInput::text(question).with_marker("query")))
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_secs())
}

/// One interactive chat session.
pub struct ChatSession {
    config: Config,
    client: ChatClient,
    history: ChatHistory,
    context: String,
    dispatcher: Option<JobDispatcher>,
    encrypt: bool,
    debug: bool,
    filter: FilterHandle,
    default_filter: String,
}

impl ChatSession {
    pub fn new(
        config: Config,
        client: ChatClient,
        filter: FilterHandle,
        default_filter: String,
    ) -> Self {
        Self {
            config,
            client,
            history: ChatHistory::new(prompts::ANSWER_TEMPLATE),
            context: String::new(),
            dispatcher: None,
            encrypt: false,
            debug: false,
            filter,
            default_filter,
        }
    }

    /// The read-eval loop. Returns when the user quits or stdin closes.
    pub async fn run(&mut self) -> anyhow::Result<()> {
        println!("{}", prompts::WELCOME);

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            print!("> ");
            std::io::stdout().flush()?;
            let Some(line) = lines.next_line().await? else {
                break;
            };
            match self.handle_line(line.trim()).await {
                Ok(LoopControl::Quit) => break,
                Ok(LoopControl::Continue) => {}
                Err(e) => {
                    // The session survives a failed turn.
                    tracing::error!(error = %e, "Turn failed");
                    println!("Something went wrong: {e}");
                }
            }
        }
        Ok(())
    }

    async fn handle_line(&mut self, line: &str) -> anyhow::Result<LoopControl> {
        match line {
            "" => Ok(LoopControl::Continue),
            "d" => {
                self.toggle_debug()?;
                Ok(LoopControl::Continue)
            }
            "q" => {
                println!("Goodbye!");
                Ok(LoopControl::Quit)
            }
            "e" => {
                self.toggle_encryption();
                Ok(LoopControl::Continue)
            }
            "w" => {
                self.pre_warm().await?;
                Ok(LoopControl::Continue)
            }
            input => {
                self.chat_turn(input).await?;
                Ok(LoopControl::Continue)
            }
        }
    }

    fn toggle_debug(&mut self) -> anyhow::Result<()> {
        self.debug = !self.debug;
        let directives = if self.debug {
            DEBUG_FILTER
        } else {
            self.default_filter.as_str()
        };
        tracing_init::reload_filter(&self.filter, directives)?;
        println!("Debug mode is now {}", self.debug);
        Ok(())
    }

    fn toggle_encryption(&mut self) {
        self.encrypt = !self.encrypt;
        if self.encrypt {
            println!("Select provider and enable encryption");
        } else {
            println!("Encryption and provider selection disabled");
        }
    }

    /// The provider key for `run_job`, when encryption is on.
    fn provider(&self) -> Option<&str> {
        self.encrypt.then_some(self.config.provider.as_str())
    }

    /// Lazily connect the dispatcher on first use.
    async fn dispatcher(&mut self) -> anyhow::Result<&JobDispatcher> {
        if self.dispatcher.is_none() {
            info!(relays = ?self.config.relays, "Connecting to relays");
            self.dispatcher = Some(JobDispatcher::connect(&self.config.relays).await?);
        }
        self.dispatcher
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("dispatcher unavailable"))
    }

    /// Dispatch an empty warm-up job so the provider caches the documents.
    async fn pre_warm(&mut self) -> anyhow::Result<()> {
        println!("Pre-warming the dataset... Please wait...");
        let request = rag_request(&self.config, "", true, unix_now())?;
        let provider = self.provider().map(str::to_owned);
        let started = Instant::now();
        self.dispatcher()
            .await?
            .run_job(&request, provider.as_deref())
            .await?;
        println!("Pre-warming done in {}ms", started.elapsed().as_millis());
        Ok(())
    }

    /// One full user turn: retrieval, then the streamed answer.
    async fn chat_turn(&mut self, input: &str) -> anyhow::Result<()> {
        self.history.push_user(input);
        self.refresh_context().await?;

        let messages = self.history.with_context(&self.context);
        let answer = self
            .client
            .complete_streaming(&messages, |token| {
                print!("{token}");
                let _ = std::io::stdout().flush();
            })
            .await?;
        println!();

        self.history.push_assistant(answer);
        Ok(())
    }

    /// Ask the model for a standalone query and run the retrieval job; a
    /// `NOP` answer keeps the previous context.
    async fn refresh_context(&mut self) -> anyhow::Result<()> {
        let query = self
            .client
            .complete(&prompts::retrieval_messages(&self.history))
            .await?;

        if query == prompts::SKIP_RETRIEVAL {
            debug!("No extra context needed, skipping retrieval");
            return Ok(());
        }

        println!("??? {query}... searching...");
        let request = rag_request(&self.config, &query, false, unix_now())?;
        let provider = self.provider().map(str::to_owned);
        let result = self
            .dispatcher()
            .await?
            .run_job(&request, provider.as_deref())
            .await?;
        debug!(context_len = result.len(), "Adopted new retrieval context");
        self.context = result;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    fn tag<'a>(template: &'a ragchat_proto::EventTemplate, name: &str) -> Vec<&'a str> {
        template
            .tags
            .iter()
            .filter(|t| t[0] == name)
            .map(|t| t[1].as_str())
            .collect()
    }

    #[test]
    fn rag_request_carries_params_and_documents() {
        let config = Config::default();
        let request = rag_request(&config, "how do spatials work?", false, 1_700_000_000).unwrap();
        let template = request.to_template();

        assert_eq!(template.kind, KIND_JOB_RAG);
        let params = tag(&template, "param");
        assert!(params.contains(&"run-on"));
        assert!(params.contains(&"main"));
        assert!(params.contains(&"k"));
        assert!(params.contains(&"warm-up"));

        let inputs: Vec<_> = template.tags.iter().filter(|t| t[0] == "i").collect();
        // one passage per configured document plus the query
        assert_eq!(inputs.len(), config.documents.len() + 1);
        let query = inputs.last().unwrap();
        assert_eq!(query[1], "how do spatials work?");
        assert_eq!(query[2], "text");
        assert_eq!(query[4], "query");
    }

    #[test]
    fn rag_request_expires_an_hour_out() {
        let config = Config::default();
        let request = rag_request(&config, "q", false, 1_700_000_000).unwrap();
        assert_eq!(request.expiration(), Some(1_700_000_000 + 3600));
    }

    #[test]
    fn warm_up_flag_flips_param() {
        let config = Config::default();
        let warm = rag_request(&config, "", true, 0).unwrap().to_template();
        let warm_param = warm
            .tags
            .iter()
            .find(|t| t[0] == "param" && t[1] == "warm-up")
            .unwrap();
        assert_eq!(warm_param[2], "true");

        let cold = rag_request(&config, "", false, 0).unwrap().to_template();
        let cold_param = cold
            .tags
            .iter()
            .find(|t| t[0] == "param" && t[1] == "warm-up")
            .unwrap();
        assert_eq!(cold_param[2], "false");
    }
}
