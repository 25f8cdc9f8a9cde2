pub mod config;
pub mod error;
pub mod extract;
pub mod literature;
pub mod llm;
pub mod models;
pub mod service;
pub mod session;
pub mod translate;
pub mod workflow;

pub use config::Config;
pub use error::{ReportError, Result};
pub use literature::{PubMedClient, PubMedSettings, parse_pubmed_xml};
pub use llm::{ChatModel, LlmFacade, OpenRouterModel};
pub use models::*;
pub use service::{AppState, build_router, create_app};
pub use session::ReportSession;
pub use translate::{GoogleTranslator, OutputLanguage, Translator};
pub use workflow::ReportAssistant;
