use cardgenius_advisor::{
    agent::CardAgent,
    config::AppConfig,
    conversation::ConversationTurn,
    models::ChatTurnResponse,
    spending::SpendingRecord,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn print_turn(response: &ChatTurnResponse) {
    println!("\nadvisor> {}", response.reply);
    if let Some(question) = &response.follow_up_question {
        println!("advisor> {}", question);
    }

    if !response.spending_data.is_empty() {
        println!("\n  Known so far:");
        for (category, amount) in response.spending_data.iter() {
            println!(
                "    {:<40} {:>12} ({})",
                category.display_name(),
                amount,
                category.cadence()
            );
        }
    }

    if let Some(recommendations) = &response.recommendations {
        println!("\n  Recommended cards:");
        for (i, name) in recommendations.card_names().enumerate() {
            println!("    {}. {}", i + 1, name);
        }
    }
    println!();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let config = AppConfig::from_env()?;
    let agent = CardAgent::from_config(&config)?;
    info!(extractor = agent.extractor_name(), "CardGenius advisor starting");

    println!("Tell me about your monthly spending. /reset starts over, /quit exits.\n");

    let mut history: Vec<ConversationTurn> = Vec::new();
    let mut accumulated = SpendingRecord::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await? {
        let message = line.trim();
        match message {
            "" => continue,
            "/quit" | "/exit" => break,
            "/reset" => {
                history.clear();
                accumulated = SpendingRecord::new();
                println!("Starting over.\n");
                continue;
            }
            _ => {}
        }

        match agent.chat_turn(message, &history, &accumulated).await {
            Ok(response) => {
                print_turn(&response);
                history.push(ConversationTurn::user(message));
                history.push(ConversationTurn::assistant(
                    response.reply.clone(),
                    Some(response.spending_data.clone()),
                    response.follow_up_question.clone(),
                ));
                accumulated = response.spending_data;
            }
            Err(e) if e.is_retryable() => {
                warn!(error = %e, "Turn failed");
                println!("\nadvisor> That took too long or failed upstream. Please try again.\n");
            }
            Err(e) => {
                eprintln!("Turn failed: {}", e);
            }
        }
    }

    Ok(())
}
