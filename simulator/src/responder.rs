//! CLI dialogue of one simulated device connection

use cmdfleet_shared::codec::{render_prompt, Challenge};
use cmdfleet_shared::state_machine::{CliEvent, CliMode, CliStateMachine, TransitionResult};
use cmdfleet_shared::PlatformProfile;
use std::io;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tracing::debug;

use crate::{Behavior, DeviceState, SimDevice};

type LineReader = Lines<BufReader<OwnedReadHalf>>;

/// Login attempts before the device hangs up
const LOGIN_ATTEMPTS: usize = 3;

const INVALID_INPUT: &str = "% Invalid input detected at '^' marker.";
const SOFTWARE_VERSION: &str = "15.2(4)E10";

enum Reply {
    Output(String),
    Close,
}

/// Serve one connection until the client leaves
pub(crate) async fn serve(
    socket: TcpStream,
    device: &SimDevice,
    state: &Mutex<DeviceState>,
) -> io::Result<()> {
    let (reader, mut writer) = socket.into_split();
    let mut lines = BufReader::new(reader).lines();

    if device.behavior == Behavior::Unresponsive {
        // Hold the socket open and swallow input until the peer goes away
        while lines.next_line().await?.is_some() {}
        return Ok(());
    }

    if !login(device, &mut lines, &mut writer).await? {
        return Ok(());
    }

    let profile = device.platform.profile();
    let mut fsm = CliStateMachine::starting_in(if profile.uses_enable {
        CliMode::User
    } else {
        CliMode::Privileged
    });
    writer
        .write_all(format!("\r\n{}", prompt(device, &profile, fsm.mode())).as_bytes())
        .await?;

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        let reply = if line == "enable" && profile.uses_enable {
            enable(device, &mut fsm, &mut lines, &mut writer).await?
        } else {
            let mut state = state.lock().await;
            respond(device, &profile, &mut state, &mut fsm, line)
        };

        match reply {
            Reply::Output(text) => {
                let frame = format!(
                    "{}\r\n{}",
                    text.replace('\n', "\r\n"),
                    prompt(device, &profile, fsm.mode())
                );
                writer.write_all(frame.as_bytes()).await?;
            }
            Reply::Close => {
                writer.shutdown().await?;
                return Ok(());
            }
        }
    }

    Ok(())
}

async fn login(
    device: &SimDevice,
    lines: &mut LineReader,
    writer: &mut OwnedWriteHalf,
) -> io::Result<bool> {
    writer
        .write_all(b"\r\nUser Access Verification\r\n\r\n")
        .await?;

    for attempt in 1..=LOGIN_ATTEMPTS {
        writer
            .write_all(Challenge::Username.render().as_bytes())
            .await?;
        let Some(username) = lines.next_line().await? else {
            return Ok(false);
        };

        writer
            .write_all(Challenge::Password.render().as_bytes())
            .await?;
        let Some(password) = lines.next_line().await? else {
            return Ok(false);
        };

        if username.trim() == device.username && password.trim() == device.password {
            return Ok(true);
        }

        debug!(
            "[SIM] {} rejected login for '{}' (attempt {})",
            device.hostname,
            username.trim(),
            attempt
        );
        if attempt < LOGIN_ATTEMPTS {
            writer.write_all(b"% Login invalid\r\n\r\n").await?;
        }
    }

    writer.write_all(b"% Authentication failed\r\n").await?;
    writer.shutdown().await?;
    Ok(false)
}

async fn enable(
    device: &SimDevice,
    fsm: &mut CliStateMachine,
    lines: &mut LineReader,
    writer: &mut OwnedWriteHalf,
) -> io::Result<Reply> {
    if fsm.is_privileged() {
        return Ok(Reply::Output(String::new()));
    }

    let Some(expected) = device.secret.as_deref() else {
        fsm.process_event(CliEvent::Enable);
        return Ok(Reply::Output(String::new()));
    };

    writer
        .write_all(Challenge::Password.render().as_bytes())
        .await?;
    let Some(given) = lines.next_line().await? else {
        return Ok(Reply::Close);
    };

    if given.trim() == expected {
        fsm.process_event(CliEvent::Enable);
        Ok(Reply::Output(String::new()))
    } else {
        Ok(Reply::Output("% Access denied".to_string()))
    }
}

fn respond(
    device: &SimDevice,
    profile: &PlatformProfile,
    state: &mut DeviceState,
    fsm: &mut CliStateMachine,
    line: &str,
) -> Reply {
    if line.is_empty() {
        return Reply::Output(String::new());
    }

    if fsm.mode() == CliMode::Config {
        return configure(profile, state, fsm, line);
    }

    if profile.disable_paging == Some(line) {
        return Reply::Output(String::new());
    }

    if profile.config_enter == Some(line) {
        return match fsm.process_event(CliEvent::ConfigureTerminal) {
            TransitionResult::Success(_) => Reply::Output(
                "Enter configuration commands, one per line.  End with CNTL/Z.".to_string(),
            ),
            _ => invalid_input(),
        };
    }

    if !profile.save_in_config && profile.save.contains(&line) {
        if !fsm.is_privileged() {
            return invalid_input();
        }
        save(state);
        return Reply::Output("Building configuration...\n[OK]".to_string());
    }

    match line {
        "exit" | "logout" | "quit" => match fsm.process_event(CliEvent::Exit) {
            TransitionResult::Closed => Reply::Close,
            _ => Reply::Output(String::new()),
        },
        "disable" => {
            fsm.process_event(CliEvent::Disable);
            Reply::Output(String::new())
        }
        "show version" => Reply::Output(version_text(device)),
        "show ip interface brief" => Reply::Output(interface_table()),
        "show running-config" if fsm.is_privileged() => {
            Reply::Output(running_config(device, state))
        }
        _ => match profile.json_suffix.and_then(|suffix| line.strip_suffix(suffix)) {
            Some("show version") => Reply::Output(version_json(device)),
            _ => invalid_input(),
        },
    }
}

fn configure(
    profile: &PlatformProfile,
    state: &mut DeviceState,
    fsm: &mut CliStateMachine,
    line: &str,
) -> Reply {
    if line == "end" || line == "exit" || profile.config_exit == Some(line) {
        fsm.process_event(CliEvent::End);
        return Reply::Output(String::new());
    }

    if profile.save_in_config && profile.save.contains(&line) {
        save(state);
        let message = if line == "commit" {
            "commit complete"
        } else {
            "Saving configuration to '/config/config.boot'...\nDone"
        };
        return Reply::Output(message.to_string());
    }

    if line.contains("invalid") {
        return invalid_input();
    }

    state.running.push(line.to_string());
    Reply::Output(String::new())
}

fn save(state: &mut DeviceState) {
    state.startup = state.running.clone();
    state.saves += 1;
}

fn prompt(device: &SimDevice, profile: &PlatformProfile, mode: CliMode) -> String {
    match mode {
        CliMode::Config if !profile.marks_config_prompt => {
            render_prompt(&device.hostname, CliMode::Privileged)
        }
        mode => render_prompt(&device.hostname, mode),
    }
}

fn invalid_input() -> Reply {
    Reply::Output(format!("        ^\n{}", INVALID_INPUT))
}

fn version_text(device: &SimDevice) -> String {
    format!(
        "Simulated {} Software, Version {}\n{} uptime is 3 weeks, 2 days, 4 hours\nSystem image file is \"flash:sim-universalk9.bin\"",
        device.platform, SOFTWARE_VERSION, device.hostname
    )
}

fn version_json(device: &SimDevice) -> String {
    serde_json::json!({
        "hostname": device.hostname,
        "platform": device.platform.as_str(),
        "version": SOFTWARE_VERSION,
        "uptime": "3 weeks, 2 days, 4 hours",
    })
    .to_string()
}

fn interface_table() -> String {
    [
        "Interface              IP-Address      OK? Method Status                Protocol",
        "Vlan1                  10.0.0.2        YES NVRAM  up                    up",
        "GigabitEthernet0/1     unassigned      YES unset  up                    up",
        "GigabitEthernet0/2     unassigned      YES unset  administratively down down",
    ]
    .join("\n")
}

fn running_config(device: &SimDevice, state: &DeviceState) -> String {
    let mut config = vec![
        "Building configuration...".to_string(),
        String::new(),
        "Current configuration:".to_string(),
        "!".to_string(),
        format!("hostname {}", device.hostname),
        "!".to_string(),
    ];
    config.extend(state.running.iter().cloned());
    config.push("!".to_string());
    config.push("end".to_string());
    config.join("\n")
}
