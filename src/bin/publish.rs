use clap::Parser;

use shortmesh_dispatch::config::Config;
use shortmesh_dispatch::message::QueuedMessage;
use shortmesh_dispatch::publish::Publisher;

/// Enqueue a single message onto the shortmesh exchange.
#[derive(Parser, Debug)]
struct Args {
    #[arg(long)]
    device_id: String,
    #[arg(long)]
    contact: String,
    #[arg(long)]
    platform_name: String,
    #[arg(long)]
    text: String,
    #[arg(long)]
    username: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    stderrlog::new()
        .verbosity(log::Level::Info)
        .timestamp(stderrlog::Timestamp::Millisecond)
        .init()
        .unwrap();

    let args = Args::parse();
    let _ = dotenvy::dotenv();
    let config = Config::load()?;

    let publisher = Publisher::connect(&config.rabbitmq_url, &config.message_exchange_name).await?;

    let msg = QueuedMessage {
        device_id: args.device_id,
        contact: args.contact,
        platform_name: args.platform_name,
        text: args.text,
        username: args.username,
    };

    publisher.publish(&msg).await?;
    println!("message published successfully");

    publisher.close().await?;
    Ok(())
}
