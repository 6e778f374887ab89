use std::io::{self, BufRead, Write};

use clap::{Parser, Subcommand};
use core_orchestrator::JournalCore;
use core_types::{Entry, EntryContent, EntryId, JournalError, SessionMode};
use i18n::I18n;
use serde_json::Value;
use tracing::debug;

#[derive(Debug, Parser)]
#[command(no_binary_name = true, name = "", disable_version_flag = true)]
struct ShellLine {
    #[command(subcommand)]
    command: ShellCommand,
}

#[derive(Debug, Subcommand)]
enum ShellCommand {
    /// Create an account on the journal service
    Register { username: String, password: String },
    /// Sign in; discards guest entries
    Login { username: String, password: String },
    /// Sign out and return to guest mode
    Logout,
    /// Show the signed-in profile
    Whoami,
    /// Show the current mode
    Mode,
    /// Write a new entry
    Add {
        #[arg(long)]
        mood: Option<String>,
        #[arg(required = true, num_args = 1.., trailing_var_arg = true)]
        text: Vec<String>,
    },
    /// List entries, newest first
    List,
    /// Change an entry's text and/or mood
    Edit {
        id: String,
        #[arg(long)]
        mood: Option<String>,
        #[arg(num_args = 0.., trailing_var_arg = true)]
        text: Vec<String>,
    },
    /// Delete an entry
    Delete { id: String },
    /// Leave the shell
    #[command(alias = "exit")]
    Quit,
}

impl ShellCommand {
    fn name(&self) -> &'static str {
        match self {
            ShellCommand::Register { .. } => "register",
            ShellCommand::Login { .. } => "login",
            ShellCommand::Logout => "logout",
            ShellCommand::Whoami => "whoami",
            ShellCommand::Mode => "mode",
            ShellCommand::Add { .. } => "add",
            ShellCommand::List => "list",
            ShellCommand::Edit { .. } => "edit",
            ShellCommand::Delete { .. } => "delete",
            ShellCommand::Quit => "quit",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

pub struct Shell<'a> {
    core: &'a JournalCore,
    i18n: &'a I18n,
    guest_warned: bool,
}

impl<'a> Shell<'a> {
    pub fn new(core: &'a JournalCore, i18n: &'a I18n) -> Self {
        Self {
            core,
            i18n,
            guest_warned: false,
        }
    }

    pub fn prompt(&self) -> String {
        let mode = match self.core.mode() {
            SessionMode::Guest => self.i18n.t("mode.guest"),
            SessionMode::Authenticated => self.i18n.t("mode.authenticated"),
        };
        format!("[{mode}] > ")
    }

    pub async fn handle_line(
        &mut self,
        line: &str,
        input: &mut impl BufRead,
        out: &mut impl Write,
    ) -> io::Result<Flow> {
        let words: Vec<&str> = line.split_whitespace().collect();
        if words.is_empty() {
            return Ok(Flow::Continue);
        }

        let command = match ShellLine::try_parse_from(words) {
            Ok(parsed) => parsed.command,
            Err(err) => {
                use clap::error::ErrorKind;
                match err.kind() {
                    ErrorKind::InvalidSubcommand => {
                        writeln!(out, "{}", self.i18n.t("shell.unknown"))?
                    }
                    _ => write!(out, "{err}")?,
                }
                return Ok(Flow::Continue);
            }
        };
        debug!(command = command.name(), "shell command");
        self.execute(command, input, out).await
    }

    async fn execute(
        &mut self,
        command: ShellCommand,
        input: &mut impl BufRead,
        out: &mut impl Write,
    ) -> io::Result<Flow> {
        match command {
            ShellCommand::Register { username, password } => {
                match self.core.register(&username, &password).await {
                    Ok(_) => writeln!(out, "{}", self.i18n.t("register.success"))?,
                    Err(err) => self.notice(out, "register.failed", &err)?,
                }
            }
            ShellCommand::Login { username, password } => {
                let pending = self.core.guest_entry_count();
                if pending > 0 && !self.confirm_discard(pending, input, out)? {
                    writeln!(out, "{}", self.i18n.t("login.cancelled"))?;
                    return Ok(Flow::Continue);
                }
                match self.core.login(&username, &password).await {
                    Ok(_) => writeln!(out, "{}", self.i18n.t("login.success"))?,
                    Err(err) => self.notice(out, "login.failed", &err)?,
                }
            }
            ShellCommand::Logout => {
                self.core.logout();
                self.guest_warned = false;
                writeln!(out, "{}", self.i18n.t("logout.done"))?;
            }
            ShellCommand::Whoami => match self.core.profile().await {
                Ok(profile) => {
                    let rendered = serde_json::to_string_pretty(&profile)
                        .unwrap_or_else(|_| profile.username.clone());
                    writeln!(out, "{rendered}")?;
                }
                Err(err) => self.notice(out, "profile.failed", &err)?,
            },
            ShellCommand::Mode => {
                writeln!(out, "{}", self.core.mode())?;
            }
            ShellCommand::Add { mood, text } => {
                if self.core.mode() == SessionMode::Guest && !self.guest_warned {
                    writeln!(out, "{}", self.i18n.t("guest.warning"))?;
                    self.guest_warned = true;
                }
                let content = entry_content(Some(text.join(" ")), mood);
                match self.core.create_entry(content).await {
                    Ok(entry) => {
                        let id = entry.id.to_string();
                        writeln!(out, "{}", self.i18n.tf("entry.created", &[("id", &id)]))?;
                    }
                    Err(err) => self.notice(out, "entry.failed", &err)?,
                }
            }
            ShellCommand::List => match self.core.list_entries().await {
                Ok(entries) if entries.is_empty() => {
                    writeln!(out, "{}", self.i18n.t("entries.empty"))?
                }
                Ok(entries) => {
                    for entry in &entries {
                        writeln!(out, "{}", render_entry(entry))?;
                    }
                }
                Err(err) => self.notice(out, "entry.failed", &err)?,
            },
            ShellCommand::Edit { id, mood, text } => {
                let text = (!text.is_empty()).then(|| text.join(" "));
                let patch = entry_content(text, mood);
                if patch.is_empty() {
                    writeln!(out, "{}", self.i18n.t("entry.nothing_to_update"))?;
                    return Ok(Flow::Continue);
                }
                let id = EntryId::parse(&id);
                match self.core.update_entry(&id, patch).await {
                    Ok(()) => {
                        let id = id.to_string();
                        writeln!(out, "{}", self.i18n.tf("entry.updated", &[("id", &id)]))?;
                    }
                    Err(err) => self.notice(out, "entry.failed", &err)?,
                }
            }
            ShellCommand::Delete { id } => {
                let id = EntryId::parse(&id);
                match self.core.delete_entry(&id).await {
                    Ok(()) => {
                        let id = id.to_string();
                        writeln!(out, "{}", self.i18n.tf("entry.deleted", &[("id", &id)]))?;
                    }
                    Err(err) => self.notice(out, "entry.failed", &err)?,
                }
            }
            ShellCommand::Quit => {
                writeln!(out, "{}", self.i18n.t("shell.bye"))?;
                return Ok(Flow::Quit);
            }
        }
        Ok(Flow::Continue)
    }

    fn confirm_discard(
        &self,
        pending: usize,
        input: &mut impl BufRead,
        out: &mut impl Write,
    ) -> io::Result<bool> {
        let count = pending.to_string();
        writeln!(
            out,
            "{}",
            self.i18n.tf("guest.discard_confirm", &[("count", &count)])
        )?;
        out.flush()?;
        let mut answer = String::new();
        input.read_line(&mut answer)?;
        Ok(matches!(answer.trim(), "y" | "Y" | "yes"))
    }

    fn notice(&self, out: &mut impl Write, title_key: &str, err: &JournalError) -> io::Result<()> {
        writeln!(out, "{}: {}", self.i18n.t(title_key), err.message())
    }
}

fn entry_content(text: Option<String>, mood: Option<String>) -> EntryContent {
    let mut content = EntryContent::new();
    if let Some(text) = text {
        content.insert("text".to_string(), Value::String(text));
    }
    if let Some(mood) = mood {
        content.insert("mood".to_string(), Value::String(mood));
    }
    content
}

fn render_entry(entry: &Entry) -> String {
    let mut line = format!("[{}] {}", entry.id, entry.created_at);
    if let Some(mood) = entry.content.get("mood").and_then(Value::as_str) {
        line.push_str(&format!(" ({mood})"));
    }
    if let Some(text) = entry.text() {
        line.push_str(&format!(" {text}"));
    }
    let extra: Vec<String> = entry
        .content
        .iter()
        .filter(|(key, _)| key.as_str() != "text" && key.as_str() != "mood")
        .map(|(key, value)| format!("{key}={value}"))
        .collect();
    if !extra.is_empty() {
        line.push_str(&format!(" {{{}}}", extra.join(", ")));
    }
    line
}
