use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Direction;

/// Lifecycle of a command. `Completed` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl CommandStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "processing" => Some(Self::Processing),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Instruction type carried by a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InstructionType {
    OpenTrade,
}

/// What the execution client should do.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Instruction {
    #[serde(rename = "type")]
    pub kind: InstructionType,
    pub symbol: String,
    pub direction: Direction,
    /// Numeric order-type code (0 = buy, 1 = sell).
    pub direction_code: u8,
    pub lot_size: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
}

/// One unit of work for one account, derived from one signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Command {
    pub id: Uuid,
    pub account_id: String,
    pub signal_id: Uuid,
    pub instruction: Instruction,
    pub status: CommandStatus,
    /// Unix timestamps (milliseconds).
    pub created_at: i64,
    pub picked_up_at: Option<i64>,
    pub executed_at: Option<i64>,
    /// Broker ticket on success.
    pub ticket_id: Option<String>,
    /// Error text on failure.
    pub error: Option<String>,
}

impl Command {
    /// New pending OPEN_TRADE command.
    pub fn open_trade(account_id: &str, signal_id: Uuid, instruction: Instruction, now_ms: i64) -> Self {
        Self {
            id: Uuid::new_v4(),
            account_id: account_id.to_string(),
            signal_id,
            instruction,
            status: CommandStatus::Pending,
            created_at: now_ms,
            picked_up_at: None,
            executed_at: None,
            ticket_id: None,
            error: None,
        }
    }
}

/// Poll endpoint response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollResponse {
    pub has_command: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instruction: Option<Instruction>,
}

impl PollResponse {
    pub fn empty() -> Self {
        Self {
            has_command: false,
            command_id: None,
            instruction: None,
        }
    }
}

impl From<Option<Command>> for PollResponse {
    fn from(command: Option<Command>) -> Self {
        match command {
            Some(c) => Self {
                has_command: true,
                command_id: Some(c.id),
                instruction: Some(c.instruction),
            },
            None => Self::empty(),
        }
    }
}

/// Execution outcome reported by a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionReport {
    pub command_id: Uuid,
    pub success: bool,
    #[serde(default)]
    pub ticket_id: Option<String>,
    #[serde(default)]
    pub error_text: Option<String>,
    #[serde(default)]
    pub new_balance: Option<f64>,
    /// Realized profit (positive) or loss (negative) of the trade.
    #[serde(default)]
    pub profit: Option<f64>,
}

/// Terminal transition for a `processing` command.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Completion<'a> {
    pub command_id: Uuid,
    /// `Completed` or `Failed`.
    pub status: CommandStatus,
    pub ticket_id: Option<&'a str>,
    pub error: Option<&'a str>,
    pub executed_at: i64,
}

impl<'a> Completion<'a> {
    pub fn new(
        command_id: Uuid,
        success: bool,
        ticket_id: Option<&'a str>,
        error: Option<&'a str>,
        executed_at: i64,
    ) -> Self {
        let status = if success {
            CommandStatus::Completed
        } else {
            CommandStatus::Failed
        };
        Self {
            command_id,
            status,
            ticket_id,
            error,
            executed_at,
        }
    }
}

/// A `processing` command that has gone without a report past the staleness window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StaleCommand {
    pub command: Command,
    /// Seconds since pick-up.
    pub age_secs: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instruction() -> Instruction {
        Instruction {
            kind: InstructionType::OpenTrade,
            symbol: "XAUUSD".to_string(),
            direction: Direction::Buy,
            direction_code: 0,
            lot_size: 0.02,
            stop_loss: 2340.0,
            take_profit: 2360.0,
        }
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(!CommandStatus::Pending.is_terminal());
        assert!(!CommandStatus::Processing.is_terminal());
        assert!(CommandStatus::Completed.is_terminal());
        assert!(CommandStatus::Failed.is_terminal());
    }

    #[test]
    fn test_instruction_wire_format() {
        let json = serde_json::to_value(instruction()).unwrap();
        assert_eq!(json["type"], "OPEN_TRADE");
        assert_eq!(json["lotSize"], 0.02);
        assert_eq!(json["directionCode"], 0);
    }

    #[test]
    fn test_empty_poll_response_omits_command() {
        let json = serde_json::to_string(&PollResponse::empty()).unwrap();
        assert_eq!(json, r#"{"hasCommand":false}"#);
    }

    #[test]
    fn test_poll_response_from_command() {
        let command = Command::open_trade("acct", Uuid::new_v4(), instruction(), 0);
        let id = command.id;
        let response = PollResponse::from(Some(command));
        assert!(response.has_command);
        assert_eq!(response.command_id, Some(id));
    }

    #[test]
    fn test_report_optional_fields_default() {
        let report: ExecutionReport = serde_json::from_str(
            r#"{"commandId":"6f1c2b9e-2f0a-4c55-9d43-0b6e1d1f3a10","success":false}"#,
        )
        .unwrap();
        assert!(!report.success);
        assert!(report.ticket_id.is_none());
        assert!(report.profit.is_none());
    }
}
