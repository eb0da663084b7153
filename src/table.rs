//! plain text tables for the command line tools

use std::fmt;

use crate::account_status::AccountStatusSource;
use crate::query::MembershipTable;
use crate::record::UserRecord;

/// horizontal alignment of a column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Align {
    /// pad on the right
    Left,
    /// pad on both sides
    Center,
}

/// a table with a header row and bordered cells
#[derive(Debug, Clone)]
pub struct Table {
    /// column titles
    headers: Vec<String>,
    /// column alignments
    align: Vec<Align>,
    /// cell contents
    rows: Vec<Vec<String>>,
}

impl Table {
    /// an empty table with the given columns
    pub fn new(columns: &[(&str, Align)]) -> Self {
        Table {
            headers: columns.iter().map(|(h, _)| h.to_string()).collect(),
            align: columns.iter().map(|(_, a)| *a).collect(),
            rows: Vec::new(),
        }
    }

    /// append a row, missing cells are left empty and extra cells dropped
    pub fn add_row(&mut self, mut row: Vec<String>) {
        row.resize(self.headers.len(), String::new());
        self.rows.push(row);
    }

    /// number of data rows
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// true if there are no data rows
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// display width of every column
    fn widths(&self) -> Vec<usize> {
        let mut widths: Vec<usize> = self.headers.iter().map(|h| h.chars().count()).collect();
        for row in &self.rows {
            for (w, cell) in widths.iter_mut().zip(row) {
                *w = (*w).max(cell.chars().count());
            }
        }
        widths
    }

    /// write one row of cells
    fn write_row(
        f: &mut fmt::Formatter<'_>,
        cells: &[String],
        widths: &[usize],
        align: &[Align],
    ) -> fmt::Result {
        write!(f, "|")?;
        for ((cell, width), align) in cells.iter().zip(widths).zip(align) {
            let pad = width - cell.chars().count();
            let (left, right) = match align {
                Align::Left => (0, pad),
                Align::Center => (pad / 2, pad - pad / 2),
            };
            write!(f, " {}{}{} |", " ".repeat(left), cell, " ".repeat(right))?;
        }
        writeln!(f)
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let widths = self.widths();
        let separator: String = widths
            .iter()
            .map(|w| format!("+{}", "-".repeat(w + 2)))
            .collect::<String>()
            + "+";
        writeln!(f, "{}", separator)?;
        let center = vec![Align::Center; widths.len()];
        Table::write_row(f, &self.headers, &widths, &center)?;
        writeln!(f, "{}", separator)?;
        for row in &self.rows {
            Table::write_row(f, row, &widths, &self.align)?;
        }
        write!(f, "{}", separator)
    }
}

/// the columns every user table starts with
const USER_COLUMNS: &[(&str, Align)] = &[
    ("Name", Align::Left),
    ("Login", Align::Left),
    ("E-Mail", Align::Left),
    ("Department", Align::Center),
    ("Life/Guest Number", Align::Center),
    ("Can Login", Align::Center),
];

/// the user cells of a row, including the adquery based login flag
fn user_cells(user: &UserRecord, status: &dyn AccountStatusSource) -> Vec<String> {
    let can_login = match status.account_status(&user.sam_account_name) {
        Ok(s) if s.can_login() => "Yes".to_string(),
        Ok(_) => String::new(),
        Err(err) => {
            tracing::warn!(
                "Account status of {} unavailable: {}",
                user.sam_account_name,
                err
            );
            "ERROR".to_string()
        }
    };
    vec![
        user.display_name.clone(),
        user.sam_account_name.clone(),
        user.mail.clone().unwrap_or_default(),
        user.description.clone().unwrap_or_default(),
        user.employee_id.clone().unwrap_or_default(),
        can_login,
    ]
}

/// one row per user
pub fn user_table(users: &[UserRecord], status: &dyn AccountStatusSource) -> Table {
    let mut table = Table::new(USER_COLUMNS);
    for user in users {
        table.add_row(user_cells(user, status));
    }
    table
}

/// one row per login with a `Yes` column for each group it is a member of
pub fn membership_table(
    memberships: &MembershipTable,
    labels: &[&str],
    status: &dyn AccountStatusSource,
) -> Table {
    let mut columns: Vec<(&str, Align)> = USER_COLUMNS.to_vec();
    for (i, group) in memberships.groups.iter().enumerate() {
        columns.push((labels.get(i).copied().unwrap_or(group.as_str()), Align::Center));
    }
    let mut table = Table::new(&columns);
    for row in memberships.rows.values() {
        let mut cells = user_cells(&row.user, status);
        for group in &memberships.groups {
            let member = row.groups.get(group).copied().unwrap_or(false);
            cells.push(if member { "Yes" } else { "" }.to_string());
        }
        table.add_row(cells);
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account_status::{AccountStatus, AccountStatusError};

    struct Status;

    impl AccountStatusSource for Status {
        fn account_status(&self, login: &str) -> Result<AccountStatus, AccountStatusError> {
            match login {
                "alice" => Ok(AccountStatus::parse("zoneEnabled:true\n")),
                "bob" => Ok(AccountStatus::parse("zoneEnabled:false\n")),
                _ => Err(AccountStatusError::Spawn {
                    program: "adquery".into(),
                    source: std::io::Error::from(std::io::ErrorKind::NotFound),
                }),
            }
        }
    }

    fn user(login: &str, name: &str) -> UserRecord {
        UserRecord {
            sam_account_name: login.to_string(),
            distinguished_name: format!("CN={},OU=Users", name),
            display_name: name.to_string(),
            employee_id: Some("1".to_string()),
            mail: None,
            description: Some("PS".to_string()),
        }
    }

    #[test]
    fn renders_bordered_rows() {
        let mut table = Table::new(&[("A", Align::Left), ("Bee", Align::Center)]);
        table.add_row(vec!["xyz".to_string(), "q".to_string()]);
        assert_eq!(
            table.to_string(),
            "+-----+-----+\n\
             |  A  | Bee |\n\
             +-----+-----+\n\
             | xyz |  q  |\n\
             +-----+-----+"
        );
    }

    #[test]
    fn can_login_column() {
        let table = user_table(
            &[user("alice", "Alice"), user("bob", "Bob"), user("carol", "Carol")],
            &Status,
        );
        let rows = &table.rows;
        assert_eq!(rows[0][5], "Yes");
        assert_eq!(rows[1][5], "");
        assert_eq!(rows[2][5], "ERROR");
        assert_eq!(rows[2][4], "1");
    }

    #[test]
    fn short_rows_are_padded() {
        let mut table = Table::new(&[("A", Align::Left), ("B", Align::Left)]);
        table.add_row(vec!["only".to_string()]);
        assert_eq!(table.len(), 1);
        assert_eq!(table.rows[0], vec!["only".to_string(), String::new()]);
    }
}
