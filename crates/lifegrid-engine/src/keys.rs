//! Interactive key input from stdin.

use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Forward every character typed on stdin to `keys`.
///
/// Reads on a dedicated OS thread: a blocking stdin read cannot be
/// cancelled, and must not hold up runtime shutdown. The thread ends when
/// stdin closes or the receiver is dropped.
pub fn spawn_key_reader(keys: mpsc::Sender<char>) {
    let spawned = std::thread::Builder::new()
        .name(String::from("stdin-keys"))
        .spawn(move || {
            for line in std::io::stdin().lines() {
                let line = match line {
                    Ok(line) => line,
                    Err(e) => {
                        warn!(error = %e, "Failed to read stdin, key input disabled");
                        return;
                    }
                };
                for key in line.chars() {
                    if keys.blocking_send(key).is_err() {
                        debug!("Control loop gone, stopping key reader");
                        return;
                    }
                }
            }
            debug!("Stdin closed");
        });

    if let Err(e) = spawned {
        warn!(error = %e, "Failed to start key reader, key input disabled");
    }
}
