use medical_report_service::{PubMedClient, PubMedSettings};
use std::env;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: {} <topic> [max_results]", args[0]);
        eprintln!("Example: {} \"type 2 diabetes metformin\" 5", args[0]);
        std::process::exit(1);
    }

    let topic = &args[1];
    let max_results = match args.get(2) {
        Some(value) => value.parse()?,
        None => 5,
    };

    let client = PubMedClient::new(PubMedSettings {
        api_key: env::var("PUBMED_API_KEY").ok(),
        ..PubMedSettings::default()
    })?;

    info!("Searching PubMed for '{}'", topic);
    let outcome = client.search(topic, max_results).await;

    if let Some(e) = &outcome.error {
        error!("Search reported an error: {}", e);
    }

    info!("Found {} articles", outcome.records.len());
    for (i, record) in outcome.records.iter().enumerate() {
        info!("\nArticle {}:", i + 1);
        info!("  PMID: {}", record.pmid.as_deref().unwrap_or("-"));
        info!("  Title: {}", record.title);
        info!("  URL: {}", record.url.as_deref().unwrap_or("-"));
        info!("  Abstract: {}", record.abstract_text);
    }

    Ok(())
}
