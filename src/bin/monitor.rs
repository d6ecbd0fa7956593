//! The monitor/UI process (§4.6): listens on a Unix-domain socket, spawns
//! one thread per connected client, and renders progress with `indicatif`.
//!
//! Grounded on `examples/original_source/src/mon/main.cc`'s `Monitor`
//! struct: a listen thread (here, the accept loop spawning per-client
//! threads), a mutex-protected table of running/completed jobs and
//! analyzed-function names, and client removal on disconnect (the original
//! detects this via `POLLHUP`; a blocking read returning an error or EOF is
//! the equivalent signal for a dedicated per-client thread).

use aeg_spectre::monitor::{self, Function, Message};
use clap::{App, Arg};
use console::style;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::collections::{HashMap, HashSet};
use std::os::unix::net::{UnixListener, UnixStream};
use std::sync::{Arc, Mutex};
use std::thread;

struct RunningJob {
    bar: ProgressBar,
}

struct State {
    multi: Arc<MultiProgress>,
    clients: usize,
    running: HashMap<Function, RunningJob>,
    completed: Vec<Function>,
    analyzed: HashSet<Function>,
}

impl State {
    fn new(multi: Arc<MultiProgress>) -> Self {
        Self {
            multi,
            clients: 0,
            running: HashMap::new(),
            completed: Vec::new(),
            analyzed: HashSet::new(),
        }
    }
}

fn progress_style() -> ProgressStyle {
    ProgressStyle::default_bar().template("[{bar:30}] {percent}% {msg}")
}

fn apply(state: &mut State, msg: Message) {
    match msg {
        Message::ClientConnect { pid } => {
            state.clients += 1;
            println!("{} client connected (pid {})", style("[+]").green(), pid);
        }
        Message::FunctionStarted { function } => {
            let bar = state.multi.add(ProgressBar::new(100));
            bar.set_style(progress_style());
            bar.set_message(&function.name);
            state.running.insert(function, RunningJob { bar });
        }
        Message::FunctionProgress { function, frac } => {
            if let Some(job) = state.running.get(&function) {
                let pct = (frac.max(0.0).min(1.0) * 100.0) as u64;
                job.bar.set_position(pct);
            }
        }
        Message::FunctionStep { function, step } => {
            if let Some(job) = state.running.get(&function) {
                job.bar.set_message(&format!("{}: {}", function.name, step));
            }
        }
        Message::FunctionProperties { function, properties } => {
            if let Some(job) = state.running.get(&function) {
                let summary: Vec<String> = properties.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
                job.bar.set_message(&format!("{}: {}", function.name, summary.join(", ")));
            }
        }
        Message::FunctionCompleted { function } => {
            if let Some(job) = state.running.remove(&function) {
                job.bar.finish_with_message(&format!("{}: done", function.name));
            }
            state.completed.push(function);
        }
        Message::FunctionsAnalyzed { functions } => {
            for function in functions {
                state.analyzed.insert(function);
            }
            println!(
                "{} {} functions analyzed so far",
                style("[i]").blue(),
                state.analyzed.len()
            );
        }
    }
}

fn handle_client(mut stream: UnixStream, state: Arc<Mutex<State>>) {
    loop {
        match monitor::read_message(&mut stream) {
            Ok(msg) => {
                let mut state = state.lock().expect("monitor state lock poisoned");
                apply(&mut state, msg);
            }
            Err(_) => break,
        }
    }

    let mut state = state.lock().expect("monitor state lock poisoned");
    state.clients = state.clients.saturating_sub(1);
    println!("{} client disconnected", style("[-]").yellow());
}

fn main() {
    let matches = App::new("aeg-spectre-monitor")
        .about("Monitor/UI process: renders core progress received over a Unix socket")
        .arg(
            Arg::with_name("socket")
                .help("path of the Unix-domain socket to listen on")
                .required(true)
                .index(1),
        )
        .get_matches();

    let socket_path = matches.value_of("socket").expect("socket is required");
    let _ = std::fs::remove_file(socket_path);

    let listener = match UnixListener::bind(socket_path) {
        Ok(listener) => listener,
        Err(e) => {
            eprintln!("{}", style(format!("failed to bind {}: {}", socket_path, e)).bold().red());
            std::process::exit(1);
        }
    };

    let multi = Arc::new(MultiProgress::new());
    let state = Arc::new(Mutex::new(State::new(Arc::clone(&multi))));

    {
        let state = Arc::clone(&state);
        thread::spawn(move || {
            for incoming in listener.incoming() {
                match incoming {
                    Ok(stream) => {
                        let state = Arc::clone(&state);
                        thread::spawn(move || handle_client(stream, state));
                    }
                    Err(e) => eprintln!("warning: accept failed: {}", e),
                }
            }
        });
    }

    if let Err(e) = multi.join() {
        eprintln!("warning: progress display exited: {}", e);
    }
}
