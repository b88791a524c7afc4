use std::fmt;

use serde::{Deserialize, Serialize};

/// Per-run counters handed to the report writer and the notifier.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub scanned: u64,
    pub hashed: u64,
    pub new: u64,
    pub touched: u64,
    pub modified: u64,
    pub moved: u64,
    pub verified: u64,
    pub damaged: u64,
    pub truncated: u64,
    pub deleted: u64,
    pub repaired: u64,
    pub parity_created: u64,
    pub parity_recreated: u64,
    pub orphan_parity_cleaned: u64,
    pub errors: Vec<String>,
}

impl RunSummary {
    pub fn error(&mut self, msg: impl Into<String>) {
        self.errors.push(msg.into());
    }

    /// Joined error text as stored in the `runs.errors` column.
    pub fn errors_text(&self) -> Option<String> {
        if self.errors.is_empty() {
            None
        } else {
            Some(self.errors.join("\n"))
        }
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== rotguard run summary ===")?;
        writeln!(f, "  Files scanned:    {}", self.scanned)?;
        writeln!(f, "  Hashed:           {}", self.hashed)?;
        writeln!(f, "  New:              {}", self.new)?;
        writeln!(f, "  Touched:          {}", self.touched)?;
        writeln!(f, "  Modified:         {}", self.modified)?;
        writeln!(f, "  Moved:            {}", self.moved)?;
        writeln!(f, "  Verified:         {}", self.verified)?;
        writeln!(f, "  Damaged:          {}", self.damaged)?;
        writeln!(f, "  Truncated:        {}", self.truncated)?;
        writeln!(f, "  Deleted:          {}", self.deleted)?;
        writeln!(f, "  Repaired:         {}", self.repaired)?;
        writeln!(f, "  Parity created:   {}", self.parity_created)?;
        writeln!(f, "  Parity recreated: {}", self.parity_recreated)?;
        writeln!(f, "  Orphans cleaned:  {}", self.orphan_parity_cleaned)?;
        if !self.errors.is_empty() {
            writeln!(f, "  Errors:")?;
            for e in &self.errors {
                writeln!(f, "    {e}")?;
            }
        }
        write!(f, "============================")
    }
}
