//! Binary entrypoint that launches the chat relay server.

use std::process::ExitCode;

use chat_relay::start_chat_relay;

/// Start the relay with settings from the environment.
fn main() -> ExitCode {
    start_chat_relay::run()
}
