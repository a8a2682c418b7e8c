use std::sync::Arc;

use crate::app::{AppContext, Result, SyncError};
use crate::config::Config;
use crate::domain::Post;
use crate::sync::{ChannelDelegate, SyncEvent};

pub async fn sync_posts(ctx: &AppContext, json: bool) -> Result<()> {
    let (delegate, mut events) = ChannelDelegate::new();
    let syncer = ctx.syncer(Arc::new(delegate))?;

    println!("Syncing posts from {}", ctx.server().path);
    syncer.fetch();

    let mut count = 0;
    let mut stop_requested = false;

    let terminal = loop {
        let event = tokio::select! {
            event = events.recv() => event,
            _ = tokio::signal::ctrl_c(), if !stop_requested => {
                eprintln!("Stopping after the current page...");
                stop_requested = true;
                syncer.stop();
                continue;
            }
        };

        let event = event.ok_or_else(|| SyncError::Other("Sync ended without a result".into()))?;
        if event.is_terminal() {
            break event;
        }
        if let SyncEvent::PostFetched(post) = event {
            count += 1;
            print_post(&post, json)?;
        }
    };

    let stats = syncer.stats();
    match terminal {
        SyncEvent::Completed => println!(
            "Sync complete: {} posts, {} requests, {} bytes",
            count, stats.requests, stats.bytes
        ),
        SyncEvent::Stopped => println!(
            "Sync stopped on page {}: {} posts, {} requests, {} bytes",
            stats.page, count, stats.requests, stats.bytes
        ),
        SyncEvent::Failed(error) => {
            eprintln!("Sync failed on page {} after {} posts", stats.page, count);
            return Err(error);
        }
        SyncEvent::PostFetched(_) => {}
    }

    Ok(())
}

fn print_post(post: &Post, json: bool) -> Result<()> {
    if json {
        let line = serde_json::to_string(post).map_err(|e| SyncError::Other(e.to_string()))?;
        println!("{}", line);
        return Ok(());
    }

    let date = post
        .published_at
        .map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| "----------".to_string());
    println!("{}  {}", date, post.display_title());
    if let Some(link) = &post.link {
        println!("            {}", link);
    }
    Ok(())
}

pub async fn show_page(ctx: &AppContext, number: u32) -> Result<()> {
    let request = ctx.server().to_sync_config().page_request(number)?;
    let result = ctx.fetcher.fetch(&request).await?;
    let dictionary = result.dictionary_from_xml()?;

    let pretty =
        serde_json::to_string_pretty(&dictionary).map_err(|e| SyncError::Other(e.to_string()))?;
    println!("{}", pretty);
    Ok(())
}

pub fn show_config_path() -> Result<()> {
    let path = Config::default_config_path().map_err(|e| SyncError::Config(e.to_string()))?;
    println!("{}", path.display());
    Ok(())
}
