//! CLI smoke entry point.
//!
//! # Responsibility
//! - Verify `notetaker_core` linkage and print its version.
//! - Run one scripted session against the in-memory gateway and print the
//!   collection after each step.

use notetaker_core::{
    init_logging, ClientConfig, EventKind, MemoryGateway, Note, NoteId, NotesClient,
};
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() {
    println!("notetaker_core version={}", notetaker_core::core_version());

    let config = ClientConfig::default();
    // Why: the scripted session is still useful without logs, so a logging
    // setup failure is reported and the run continues.
    if let Err(err) = init_logging(&config.log) {
        eprintln!("logging disabled: {err}");
    }

    let gateway = Arc::new(MemoryGateway::with_notes(vec![Note::with_version(
        "seed", "Hello world", 1,
    )]));
    let mut client = match NotesClient::start(Arc::clone(&gateway), &config).await {
        Ok(client) => client,
        Err(err) => {
            eprintln!("startup failed: {err}");
            std::process::exit(1);
        }
    };
    print_notes("loaded", &client);

    client.change_draft("buy milk");
    match client.submit().await {
        Ok(outcome) => println!("created id={}", outcome.note().id),
        Err(err) => eprintln!("submit failed: {err}"),
    }
    settle().await;
    print_notes("after create + echo", &client);

    let seed = NoteId::new("seed");
    if client.select_note(&seed) {
        client.change_draft("Hello again");
        // Another client deletes the note while it is open in the form.
        gateway.emit(EventKind::Deleted, Note::with_version("seed", "", 9));
        settle().await;
        match client.submit().await {
            Ok(outcome) => println!("submit fell back, result id={}", outcome.note().id),
            Err(err) => eprintln!("submit failed: {err}"),
        }
    }
    settle().await;
    print_notes("after concurrent delete", &client);

    client.teardown().await;
    println!(
        "teardown done, live feeds={}",
        EventKind::ALL
            .iter()
            .map(|kind| gateway.subscriber_count(*kind))
            .sum::<usize>()
    );
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(20)).await;
}

fn print_notes(label: &str, client: &NotesClient<MemoryGateway>) {
    println!("-- {label}");
    for note in client.notes() {
        println!("  [{} v{}] {}", note.id, note.version, note.text);
    }
}
