// ide/src/repl.rs
use crate::Ide;
use diagnostics::{Diagnostic, NotificationVariant};
use serde_json::Value;
use session::{
    Account, AbiParam, CallRequest, DeployRequest, EditorBuffer, KVPair, Message, SaveOutcome,
};
use std::str::FromStr;

pub const HELP: &str = "\
Commands:
  ls                                   List source files
  new <name>                           Create and open a source file
  open <name>                          Open a source file
  replace <path>                       Replace the open buffer with a file's contents
  check                                Type-check the open file
  save                                 Save the open buffer
  deploy [k=v..] [--amount N] [--from ADDR]
                                       Deploy the open file
  contracts                            List deployed contracts
  use <address>                        Select a deployed contract
  call <transition> [k=v..] [--amount N] [--from ADDR]
                                       Call a transition on the selected contract
  state [address]                      Show contract state
  accounts                             List chain accounts
  block                                Show the current block number
  history                              Show deploy/call history
  help                                 Show this message
  quit                                 Exit";

/// Command line parse failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    #[error("Empty command")]
    Empty,

    #[error("Unknown command: {0} (try 'help')")]
    Unknown(String),

    #[error("{0} requires an argument: {1}")]
    MissingArgument(&'static str, &'static str),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

/// Arguments shared by deploy and call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunArgs {
    pub params: Vec<(String, String)>,
    pub amount: u128,
    pub from: Option<String>,
}

impl RunArgs {
    fn parse<'a>(mut words: impl Iterator<Item = &'a str>) -> Result<Self, CommandError> {
        let mut args = RunArgs::default();
        while let Some(word) = words.next() {
            match word {
                "--amount" => {
                    let value = words
                        .next()
                        .ok_or(CommandError::MissingArgument("--amount", "value"))?;
                    args.amount = value
                        .parse()
                        .map_err(|_| CommandError::InvalidArgument(value.to_string()))?;
                }
                "--from" => {
                    let value = words
                        .next()
                        .ok_or(CommandError::MissingArgument("--from", "address"))?;
                    args.from = Some(value.to_string());
                }
                pair => match pair.split_once('=') {
                    Some((key, value)) if !key.is_empty() => {
                        args.params.push((key.to_string(), value.to_string()));
                    }
                    _ => return Err(CommandError::InvalidArgument(pair.to_string())),
                },
            }
        }
        Ok(args)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    List,
    New(String),
    Open(String),
    Replace(String),
    Check,
    Save,
    Deploy(RunArgs),
    Contracts,
    Use(String),
    Call { transition: String, args: RunArgs },
    State(Option<String>),
    Accounts,
    Block,
    History,
    Help,
    Quit,
}

impl FromStr for Command {
    type Err = CommandError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim();
        let (keyword, rest) = line
            .split_once(char::is_whitespace)
            .map(|(k, r)| (k, r.trim()))
            .unwrap_or((line, ""));
        let mut words = rest.split_whitespace();

        let command = match keyword {
            "" => return Err(CommandError::Empty),
            "ls" => Command::List,
            "new" => Command::New(
                words
                    .next()
                    .ok_or(CommandError::MissingArgument("new", "name"))?
                    .to_string(),
            ),
            "open" => Command::Open(
                words
                    .next()
                    .ok_or(CommandError::MissingArgument("open", "name"))?
                    .to_string(),
            ),
            "replace" => Command::Replace(
                words
                    .next()
                    .ok_or(CommandError::MissingArgument("replace", "path"))?
                    .to_string(),
            ),
            "check" => Command::Check,
            "save" => Command::Save,
            "deploy" => Command::Deploy(RunArgs::parse(words)?),
            "contracts" => Command::Contracts,
            "use" => Command::Use(
                words
                    .next()
                    .ok_or(CommandError::MissingArgument("use", "address"))?
                    .to_string(),
            ),
            "call" => {
                let transition = words
                    .next()
                    .ok_or(CommandError::MissingArgument("call", "transition"))?
                    .to_string();
                Command::Call {
                    transition,
                    args: RunArgs::parse(words)?,
                }
            }
            "state" => Command::State(words.next().map(str::to_string)),
            "accounts" => Command::Accounts,
            "block" => Command::Block,
            "history" => Command::History,
            "help" | "?" => Command::Help,
            "quit" | "exit" => Command::Quit,
            other => return Err(CommandError::Unknown(other.to_string())),
        };
        Ok(command)
    }
}

/// Drives an [`Ide`] session from text commands
pub struct Repl {
    ide: Ide,
    buffer: EditorBuffer,
}

impl Repl {
    pub fn new(ide: Ide) -> Self {
        Self {
            ide,
            buffer: EditorBuffer::default(),
        }
    }

    pub fn ide(&self) -> &Ide {
        &self.ide
    }

    pub fn buffer(&self) -> &EditorBuffer {
        &self.buffer
    }

    /// Run one command and return the lines to print
    pub async fn execute(&mut self, command: Command) -> anyhow::Result<Vec<String>> {
        let lines = match command {
            Command::List => self.list(),
            Command::New(name) => {
                let code = format!("scilla_version 0\n\ncontract {} ()\n", name);
                self.ide.session().add_source(&name, code)?;
                self.ide.session().select_source(&name);
                vec![format!("Created {}", name)]
            }
            Command::Open(name) => {
                if !self.ide.session().select_source(&name) {
                    anyhow::bail!("Unknown source file: {}", name);
                }
                vec![format!("Opened {}", name)]
            }
            Command::Replace(path) => {
                let name = self.open_file()?;
                let code = tokio::fs::read_to_string(&path)
                    .await
                    .map_err(|e| anyhow::anyhow!("Cannot read {}: {}", path, e))?;
                self.buffer.set_code(code.clone());
                self.ide.session().edit(&name, code)?;
                vec![format!("{} updated ({} bytes)", name, self.buffer.code.len())]
            }
            Command::Check => self.check().await?,
            Command::Save => {
                let name = self.open_file()?;
                let code = self.buffer.code.clone();
                match self.ide.session().save(&name, code).await? {
                    SaveOutcome::Saved => vec![format!("Saved {}", name)],
                    SaveOutcome::Unchanged => vec![format!("{} has no changes", name)],
                }
            }
            Command::Deploy(args) => self.deploy(args).await?,
            Command::Contracts => self.contracts(),
            Command::Use(address) => {
                if !self.ide.session().select_contract(&address) {
                    anyhow::bail!("Unknown contract: {}", address);
                }
                vec![format!("Using {}", address)]
            }
            Command::Call { transition, args } => self.call(transition, args).await?,
            Command::State(address) => self.state(address)?,
            Command::Accounts => self.accounts(),
            Command::Block => vec![format!("Block {}", self.ide.session().chain().block_num)],
            Command::History => self.history(),
            Command::Help => vec![HELP.to_string()],
            Command::Quit => Vec::new(),
        };

        self.sync_buffer();
        Ok(lines)
    }

    /// Show every pending notification in turn
    pub fn drain_notifications(&self) -> Vec<String> {
        let session = self.ide.session();
        let mut lines = Vec::new();
        let mut current = session.visible_notification();
        while let Some(notification) = current {
            let tag = match notification.variant() {
                NotificationVariant::Success => "[ok]",
                NotificationVariant::Error => "[error]",
            };
            lines.push(format!("{} {}", tag, notification.message()));
            current = session.advance_notifications();
        }
        lines
    }

    fn sync_buffer(&mut self) {
        let buffer = std::mem::take(&mut self.buffer);
        self.buffer = self
            .ide
            .session()
            .read(|state| buffer.reconcile(state.active_source()));
    }

    fn open_file(&self) -> anyhow::Result<String> {
        if self.buffer.read_only() {
            anyhow::bail!("No file open");
        }
        Ok(self.buffer.name.clone())
    }

    fn list(&self) -> Vec<String> {
        self.ide.session().read(|state| {
            let active = state.selection().active_source.clone();
            let lines: Vec<String> = state
                .files()
                .map(|file| {
                    let marker = if active.as_deref() == Some(file.name.as_str()) {
                        "*"
                    } else {
                        " "
                    };
                    let mut line = format!("{} {}", marker, file.name);
                    if file.is_dirty() {
                        line.push_str(" (modified)");
                    }
                    if let Some(errors) = &file.error {
                        line.push_str(&format!(" [{} errors]", errors.len()));
                    }
                    line
                })
                .collect();
            if lines.is_empty() {
                vec!["No source files".to_string()]
            } else {
                lines
            }
        })
    }

    async fn check(&mut self) -> anyhow::Result<Vec<String>> {
        let name = self.open_file()?;
        let result = self.ide.session().check(&name)?.wait().await?;

        if result.is_success() {
            return Ok(vec![format!("{}: no errors", name)]);
        }

        let mut lines = vec![format!(
            "{}: {} errors",
            name,
            result.diagnostics().len()
        )];
        lines.extend(
            diagnostic_lines(result.diagnostics())
                .into_iter()
                .map(|line| format!("  {}", line)),
        );
        Ok(lines)
    }

    async fn deploy(&mut self, args: RunArgs) -> anyhow::Result<Vec<String>> {
        let name = self.open_file()?;
        let code = self
            .ide
            .session()
            .read(|state| state.file(&name).map(|f| f.code.clone()))
            .ok_or_else(|| anyhow::anyhow!("Unknown source file: {}", name))?;

        let declared = simulator::analyze(&code)
            .map(|def| def.params)
            .unwrap_or_default();
        let config = self.ide.session().config().clone();

        let request = DeployRequest {
            code,
            init: typed_params(&args.params, &declared),
            message: Message { amount: args.amount },
            deployer: self.sender(args.from.as_deref())?,
            gas_limit: config.default_gas_limit,
            gas_price: config.default_gas_price,
        };

        let output = self.ide.session().deploy(request)?.wait().await??;
        self.ide.session().select_contract(&output.address);
        Ok(vec![format!(
            "Deployed {} at {} (gas used {})",
            name, output.address, output.gas_used
        )])
    }

    async fn call(&mut self, transition: String, args: RunArgs) -> anyhow::Result<Vec<String>> {
        let (address, declared) = self
            .ide
            .session()
            .read(|state| {
                state.active_contract().map(|contract| {
                    let declared = contract
                        .abi
                        .transition(&transition)
                        .map(|t| t.params.clone())
                        .unwrap_or_default();
                    (contract.address.clone(), declared)
                })
            })
            .ok_or_else(|| anyhow::anyhow!("No contract selected"))?;
        let config = self.ide.session().config().clone();

        let request = CallRequest {
            address: address.clone(),
            transition: transition.clone(),
            params: typed_params(&args.params, &declared),
            message: Message { amount: args.amount },
            caller: self.sender(args.from.as_deref())?,
            gas_limit: config.default_gas_limit,
            gas_price: config.default_gas_price,
        };

        let output = self.ide.session().call(request)?.wait().await??;
        Ok(vec![format!(
            "{} on {} succeeded (gas used {})",
            transition, address, output.gas_used
        )])
    }

    fn contracts(&self) -> Vec<String> {
        self.ide.session().read(|state| {
            let active = state.selection().active_contract.clone();
            let lines: Vec<String> = state
                .contracts()
                .map(|contract| {
                    let marker = if active.as_deref() == Some(contract.address.as_str()) {
                        "*"
                    } else {
                        " "
                    };
                    format!("{} {} {}", marker, contract.address, contract.abi.name)
                })
                .collect();
            if lines.is_empty() {
                vec!["No contracts deployed".to_string()]
            } else {
                lines
            }
        })
    }

    fn state(&self, address: Option<String>) -> anyhow::Result<Vec<String>> {
        self.ide.session().read(|state| -> anyhow::Result<Vec<String>> {
            let contract = match &address {
                Some(address) => state.contract(address),
                None => state.active_contract(),
            }
            .ok_or_else(|| anyhow::anyhow!("No such contract"))?;

            Ok(contract
                .state
                .iter()
                .map(|kv| format!("{} : {} = {}", kv.vname, kv.ty, render_value(&kv.value)))
                .collect())
        })
    }

    fn accounts(&self) -> Vec<String> {
        self.ide
            .session()
            .chain()
            .accounts
            .values()
            .map(|a| format!("{} balance={} nonce={}", a.address, a.balance, a.nonce))
            .collect()
    }

    fn history(&self) -> Vec<String> {
        self.ide.session().read(|state| {
            state
                .history()
                .map(|record| {
                    let target = match (&record.address, &record.transition) {
                        (Some(address), Some(transition)) => format!("{} {}", transition, address),
                        (Some(address), None) => address.clone(),
                        _ => "-".to_string(),
                    };
                    let outcome = match &record.outcome {
                        Ok(gas) => format!("ok gas={}", gas),
                        Err(err) => format!("failed: {}", err),
                    };
                    format!("#{} {} {} {}", record.block_num, record.kind, target, outcome)
                })
                .collect()
        })
    }

    /// Caller account, the first chain account unless one is named
    fn sender(&self, from: Option<&str>) -> anyhow::Result<Account> {
        let snapshot = self.ide.session().chain();
        match from {
            // Unknown addresses are passed through for the chain to reject
            Some(address) => Ok(snapshot.accounts.get(address).cloned().unwrap_or(Account {
                address: address.to_string(),
                balance: 0,
                nonce: 0,
            })),
            None => snapshot
                .accounts
                .into_values()
                .next()
                .ok_or_else(|| anyhow::anyhow!("Chain has no accounts")),
        }
    }
}

/// `line:column message` as reported by the checker; line 0 has no location
pub fn diagnostic_lines(diagnostics: &[Diagnostic]) -> Vec<String> {
    diagnostics
        .iter()
        .map(|d| format!("{}:{} {}", d.line, d.column, d.message))
        .collect()
}

/// Attach declared types to `name=value` pairs
fn typed_params(params: &[(String, String)], declared: &[AbiParam]) -> Vec<KVPair> {
    params
        .iter()
        .map(|(name, value)| {
            let ty = declared
                .iter()
                .find(|p| &p.name == name)
                .map(|p| p.ty.as_str())
                .unwrap_or("String");
            KVPair::new(name.as_str(), ty, Value::String(value.clone()))
        })
        .collect()
}

fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
