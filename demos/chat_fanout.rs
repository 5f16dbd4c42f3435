use fanout::{ChannelKey, EventMessage, FanoutConfig, ObjectEventType, StreamAdapter};
use rand::Rng;
use std::env;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args: Vec<String> = env::args().collect();
    let users: usize = args.get(1).and_then(|s| s.parse().ok()).unwrap_or(3);
    let messages: usize = args.get(2).and_then(|s| s.parse().ok()).unwrap_or(10);

    let config = match FanoutConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            println!("Invalid configuration: {}", e);
            return;
        }
    };
    let adapter = match StreamAdapter::in_memory(config) {
        Ok(a) => a,
        Err(e) => {
            println!("Failed to start fan-out: {}", e);
            return;
        }
    };

    let cancel = CancellationToken::new();
    let mut servers = Vec::new();
    for user in 0..users {
        let adapter = adapter.clone();
        let cancel = cancel.clone();
        let channel = ChannelKey::new("chat", user.to_string());
        servers.push(tokio::spawn(async move {
            adapter
                .serve(channel.clone(), cancel, |message| {
                    match serde_json::to_string(message.as_ref()) {
                        Ok(json) => println!("[{}] {}", channel, json),
                        Err(e) => println!("[{}] unprintable message: {}", channel, e),
                    }
                    Ok(())
                })
                .await
        }));
    }

    // Let every subscriber attach before publishing.
    tokio::time::sleep(Duration::from_millis(50)).await;

    for i in 0..messages {
        let (user, message) = {
            let mut rng = rand::thread_rng();
            let user = rng.gen_range(0..users.max(1));
            let message = if rng.gen_bool(0.5) {
                EventMessage::content(0, [("text", format!("message #{i}"))])
            } else {
                EventMessage::object(ObjectEventType::Create, rng.gen_range(1..1000))
            };
            (user, message)
        };

        let channel = ChannelKey::new("chat", user.to_string());
        if let Err(e) = adapter.publish(&channel, &message).await {
            println!("Failed to publish to {}: {}", channel, e);
        }
    }

    tokio::time::sleep(Duration::from_millis(100)).await;
    println!("{:?}", adapter.stats());

    cancel.cancel();
    for server in servers {
        if let Ok(Err(e)) = server.await {
            println!("Subscriber ended with error: {}", e);
        }
    }
    if let Err(e) = adapter.close().await {
        println!("Failed to close: {}", e);
    }
}
