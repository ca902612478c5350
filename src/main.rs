/**
 * @file
 * @author Chanhee Lee (chanheel@asu.edu)
 * @author Hokeun Kim (hokeun@asu.edu)
 * @copyright (c) 2023, Arizona State University
 * License in [BSD 2-clause](https://github.com/lf-lang/reactor-c/blob/main/LICENSE.md)
 * @brief Run a federate with an idle scheduler, joining the federation
 * and participating in start/stop coordination only.
 */
use std::env;
use std::process;
use std::sync::Arc;

use federate::scheduler::IdleScheduler;

fn main() {
    tracing_subscriber::fmt::init();

    let args: Vec<String> = env::args().collect();
    let config = federate::Config::build(&args).unwrap_or_else(|err| {
        println!("Problem parsing arguments: {err}");
        process::exit(1);
    });

    println!(
        "Starting federate {} in federation ID {}.",
        config.fed_id, config.federation_id
    );

    let scheduler = Arc::new(IdleScheduler::new());
    let runtime = federate::run(config, scheduler).unwrap_or_else(|err| {
        println!("Federate failed to join the federation: {err}");
        process::exit(1);
    });

    runtime.wait_until_stop_requested();
}
