//! The line protocol: one command in, one response out.
//!
//! Requests are whitespace-separated tokens starting with a two-letter
//! verb. Successful responses echo the verb; every rejection is a single
//! `ER <message>` line. Accounts on the wire are written as
//! `<number>/<ipv4>`, and a command naming another bank's address is
//! refused here rather than forwarded.

use crate::ledger::{Ledger, LedgerError};
use crate::store::{FIRST_ACCOUNT, LAST_ACCOUNT};
use std::net::Ipv4Addr;
use std::sync::Arc;
use thiserror::Error;

/// One fully parsed command, ready to run against the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    BankCode,
    CreateAccount,
    Deposit { number: u32, amount: u64 },
    Withdraw { number: u32, amount: u64 },
    Balance { number: u32 },
    RemoveAccount { number: u32 },
    TotalAmount,
    ClientCount,
}

/// Everything that rejects a line before the ledger is consulted. The
/// `Display` text is the exact client-facing message, rendered behind the
/// `ER ` prefix.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum CommandError {
    #[error("Empty command")]
    Empty,

    #[error("{0} has wrong format")]
    WrongFormat(String),

    #[error("Unknown command")]
    Unknown,

    #[error("Account number has invalid format")]
    BadAccountNumber,

    #[error("Bank address has invalid format")]
    BadBankAddress,

    #[error("account number and amount have invalid format")]
    BadAmount,

    #[error("Bank does not match")]
    BankMismatch,
}

/// Parse one trimmed line into a [`Command`].
///
/// `own_addr` is this bank's address: account identifiers naming any other
/// bank are rejected during parsing, before amounts are even looked at.
pub fn parse_command(line: &str, own_addr: Ipv4Addr) -> Result<Command, CommandError> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    let Some(&first) = tokens.first() else {
        return Err(CommandError::Empty);
    };
    let verb = first.to_ascii_uppercase();

    match verb.as_str() {
        "BC" => {
            expect_tokens(&tokens, 1, &verb)?;
            Ok(Command::BankCode)
        }
        "AC" => {
            expect_tokens(&tokens, 1, &verb)?;
            Ok(Command::CreateAccount)
        }
        "AD" => {
            expect_tokens(&tokens, 3, &verb)?;
            let number = parse_account_spec(tokens[1], own_addr)?;
            let amount = parse_amount(tokens[2])?;
            Ok(Command::Deposit { number, amount })
        }
        "AW" => {
            expect_tokens(&tokens, 3, &verb)?;
            let number = parse_account_spec(tokens[1], own_addr)?;
            let amount = parse_amount(tokens[2])?;
            Ok(Command::Withdraw { number, amount })
        }
        "AB" => {
            expect_tokens(&tokens, 2, &verb)?;
            let number = parse_account_spec(tokens[1], own_addr)?;
            Ok(Command::Balance { number })
        }
        "AR" => {
            expect_tokens(&tokens, 2, &verb)?;
            let number = parse_account_spec(tokens[1], own_addr)?;
            Ok(Command::RemoveAccount { number })
        }
        "BA" => {
            expect_tokens(&tokens, 1, &verb)?;
            Ok(Command::TotalAmount)
        }
        "BN" => {
            expect_tokens(&tokens, 1, &verb)?;
            Ok(Command::ClientCount)
        }
        _ => Err(CommandError::Unknown),
    }
}

fn expect_tokens(tokens: &[&str], expected: usize, verb: &str) -> Result<(), CommandError> {
    if tokens.len() == expected {
        Ok(())
    } else {
        Err(CommandError::WrongFormat(verb.to_string()))
    }
}

/// Parse `<number>/<ipv4>`: exactly two parts, the number within this
/// bank's issuing range, the address a dotted quad matching `own_addr`.
fn parse_account_spec(spec: &str, own_addr: Ipv4Addr) -> Result<u32, CommandError> {
    let parts: Vec<&str> = spec.split('/').collect();
    if parts.len() != 2 {
        return Err(CommandError::BadAccountNumber);
    }

    let number: u32 = parts[0]
        .parse()
        .map_err(|_| CommandError::BadAccountNumber)?;
    if !(FIRST_ACCOUNT..=LAST_ACCOUNT).contains(&number) {
        return Err(CommandError::BadAccountNumber);
    }

    let bank: Ipv4Addr = parts[1]
        .parse()
        .map_err(|_| CommandError::BadBankAddress)?;
    if bank != own_addr {
        return Err(CommandError::BankMismatch);
    }

    Ok(number)
}

/// Amounts are plain non-negative integers.
fn parse_amount(token: &str) -> Result<u64, CommandError> {
    token.parse().map_err(|_| CommandError::BadAmount)
}

/// Turns one received line into exactly one response line.
///
/// Holds this bank's identity and the shared ledger; one instance serves
/// every connection.
pub struct Dispatcher {
    ledger: Arc<Ledger>,
    bank_addr: Ipv4Addr,
}

impl Dispatcher {
    pub fn new(ledger: Arc<Ledger>, bank_addr: Ipv4Addr) -> Self {
        Self { ledger, bank_addr }
    }

    /// Run one command line and produce the response line for it.
    pub async fn dispatch(&self, line: &str) -> String {
        let command = match parse_command(line, self.bank_addr) {
            Ok(command) => command,
            Err(e) => return format!("ER {}", e),
        };

        match command {
            Command::BankCode => format!("BC {}", self.bank_addr),
            Command::CreateAccount => match self.ledger.create_account().await {
                Ok(number) => format!("AC {}/{}", number, self.bank_addr),
                Err(e) => self.render_error(e),
            },
            Command::Deposit { number, amount } => {
                match self.ledger.deposit(number, amount).await {
                    Ok(()) => "AD".to_string(),
                    Err(e) => self.render_error(e),
                }
            }
            Command::Withdraw { number, amount } => {
                match self.ledger.withdraw(number, amount).await {
                    Ok(()) => "AW".to_string(),
                    Err(e) => self.render_error(e),
                }
            }
            Command::Balance { number } => match self.ledger.balance(number).await {
                Some(balance) => format!("AB {}", balance),
                None => format!("ER {}", LedgerError::AccountNotFound),
            },
            Command::RemoveAccount { number } => {
                match self.ledger.remove_account(number).await {
                    Ok(()) => "AR".to_string(),
                    Err(e) => self.render_error(e),
                }
            }
            Command::TotalAmount => format!("BA {}", self.ledger.total_amount().await),
            Command::ClientCount => format!("BN {}", self.ledger.client_count().await),
        }
    }

    /// Domain errors go to the client verbatim. Infrastructure faults are
    /// logged and masked behind a generic message.
    fn render_error(&self, e: LedgerError) -> String {
        if e.is_client_visible() {
            format!("ER {}", e)
        } else {
            tracing::error!("command failed: {}", e);
            "ER Application error, please try again later".to_string()
        }
    }
}
