//! Shared fixtures for unit tests

use crate::domain::ports::{CommandOutput, SystemCommand};
use crate::system::ScriptedExecutor;
use std::fs;
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Fake hash written by [`emulate_htpasswd`]
pub fn fake_hash(user: &str, secret: &str) -> String {
    format!("$emu${}${}", user, secret.len())
}

/// Mimics `htpasswd [-c] -b -B <file> <user> <secret>` against the real file
pub fn emulate_htpasswd(cmd: &SystemCommand) -> CommandOutput {
    let create = cmd.args.iter().any(|a| a == "-c");
    let positional: Vec<&String> = cmd.args.iter().filter(|a| !a.starts_with('-')).collect();
    let [file, user, secret] = positional[..] else {
        return CommandOutput::failure(2, "usage");
    };

    let line = format!("{}:{}\n", user, fake_hash(user, secret));
    let existing = if create {
        String::new()
    } else {
        match fs::read_to_string(file) {
            Ok(text) => text,
            Err(_) => return CommandOutput::failure(1, "cannot open file"),
        }
    };

    let prefix = format!("{}:", user);
    let mut replaced = false;
    let mut body = String::new();
    for l in existing.lines() {
        if l.starts_with(&prefix) {
            body.push_str(&line);
            replaced = true;
        } else {
            body.push_str(l);
            body.push('\n');
        }
    }
    if !replaced {
        body.push_str(&line);
    }

    let mut f = match fs::File::create(file) {
        Ok(f) => f,
        Err(e) => return CommandOutput::failure(1, e.to_string()),
    };
    if let Err(e) = f.write_all(body.as_bytes()) {
        return CommandOutput::failure(1, e.to_string());
    }
    CommandOutput::success("")
}

/// Executor with `htpasswd` emulated and everything else succeeding
pub fn host_executor() -> ScriptedExecutor {
    ScriptedExecutor::new().on("htpasswd", emulate_htpasswd)
}

/// Mimics systemctl for one unit whose running state lives in `running`.
/// Reloading a stopped unit fails the way systemd does.
pub fn emulate_systemctl(
    running: Arc<AtomicBool>,
) -> impl Fn(&SystemCommand) -> CommandOutput + Send + Sync + 'static {
    move |cmd: &SystemCommand| match cmd.args.first().map(String::as_str) {
        Some("is-active") if running.load(Ordering::SeqCst) => CommandOutput::success(""),
        Some("is-active") => CommandOutput::failure(3, ""),
        Some("start") | Some("restart") => {
            running.store(true, Ordering::SeqCst);
            CommandOutput::success("")
        }
        Some("stop") => {
            running.store(false, Ordering::SeqCst);
            CommandOutput::success("")
        }
        Some("reload") if running.load(Ordering::SeqCst) => CommandOutput::success(""),
        Some("reload") => CommandOutput::failure(
            1,
            "nginx.service is not active, cannot reload.",
        ),
        _ => CommandOutput::failure(1, "unknown operation"),
    }
}
