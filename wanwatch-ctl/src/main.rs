use exitcode::{self, ExitCode};
use std::process;

use wanwatch_lib::command::{Command, Quality, QualityResponse, Response};
use wanwatch_lib::socket;

mod cli;

// Avoid musl's default allocator due to degraded performance
#[cfg(target_os = "linux")]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

fn main() {
    let args = cli::parse();

    let json = args.command.json();
    let cmd: Command = args.command.into();
    let resp = match socket::process_cmd(&args.socket_path, &cmd) {
        Ok(resp) => resp,
        Err(socket::Error::ServiceNotRunning) => {
            eprintln!("Service not running at {}", args.socket_path.display());
            process::exit(exitcode::UNAVAILABLE);
        }
        Err(e) => {
            eprintln!("Error processing {cmd}: {e}");
            process::exit(exitcode::IOERR);
        }
    };

    let exit = if json { json_print(&resp) } else { pretty_print(&resp) };
    process::exit(exit);
}

fn exit_code(resp: &Response) -> ExitCode {
    match resp {
        Response::Quality(QualityResponse::Unavailable { .. }) => exitcode::UNAVAILABLE,
        Response::Quality(QualityResponse::UnknownDevice(_)) => exitcode::DATAERR,
        Response::Quality(QualityResponse::Reading { .. }) | Response::Status(_) | Response::Pong => exitcode::OK,
    }
}

fn json_print(resp: &Response) -> ExitCode {
    match serde_json::to_string_pretty(resp) {
        Ok(s) => println!("{s}"),
        Err(e) => {
            eprintln!("Error serializing response: {e}");
            return exitcode::SOFTWARE;
        }
    }
    exit_code(resp)
}

fn pretty_print(resp: &Response) -> ExitCode {
    // pretty print for users
    match resp {
        Response::Status(status) => print!("{status}"),
        Response::Quality(QualityResponse::Reading { device, quality }) => {
            println!("{device}: {}", Quality::Reading(*quality))
        }
        Response::Quality(QualityResponse::Unavailable { device, error }) => {
            eprintln!("{device}: quality unavailable: {error}")
        }
        Response::Quality(QualityResponse::UnknownDevice(device)) => {
            eprintln!("{device} is not a managed interface")
        }
        Response::Pong => println!("pong"),
    }
    exit_code(resp)
}
