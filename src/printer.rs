use std::fmt::Display;

use serde::{Deserialize, Serialize};
use tabled::{builder::Builder, settings::Style};

use crate::term::Expression;

/// One term per line, e.g. `+1/2 <i,j||i,j>`.
pub fn render(expression: &Expression) -> String {
    expression.to_string()
}

/// Every term as a list of strings, coefficient first.
pub fn strings(expression: &Expression) -> Vec<Vec<String>> {
    expression.iter().map(|t| t.to_strings()).collect()
}

/// Term counts per partition of a simplified expression.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    pub total: usize,
    pub fully_contracted: usize,
    pub one_body: usize,
    pub two_body: usize,
}

impl Display for Summary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut table = Builder::new();
        table.push_record(["terms".to_string(), "count".to_string()]);
        for (name, count) in [
            ("total", self.total),
            ("fully contracted", self.fully_contracted),
            ("one-body", self.one_body),
            ("two-body", self.two_body),
        ] {
            table.push_record([name.to_string(), count.to_string()]);
        }
        write!(f, "{}", table.build().with(Style::rounded()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_table_lists_partitions() {
        let summary = Summary {
            total: 5,
            fully_contracted: 3,
            one_body: 2,
            two_body: 1,
        };
        let table = summary.to_string();
        assert!(table.contains("fully contracted"));
        assert!(table.contains("two-body"));
        assert!(table.starts_with('╭'));
        assert!(table.lines().any(|l| l.contains("one-body") && l.contains('2')));
    }
}
