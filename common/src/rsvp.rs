//! RSVP state kept in the RSVP sheet: `A` timestamp, `B` name, `C` contact number, `D` RSVP.

use crate::a1::{cell, column_index, quote_sheet_name};
use crate::error::{Result, require};
use crate::format_sheet_timestamp;
use crate::sheets::{SheetStore, find_row_index, non_empty_cell};
use chrono::{DateTime, FixedOffset};
use log::info;
use serde::Serialize;

/// Data rows of the contact and RSVP columns.
const LOOKUP_RANGE: &str = "C2:D";
const APPEND_RANGE: &str = "A:D";
const RSVP_COLUMN: &str = "D";
/// First data row; row 1 holds the headers.
const FIRST_DATA_ROW: usize = 2;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum RsvpWrite {
    /// An existing row's RSVP cell was overwritten.
    Updated { row: usize },
    /// A new row was appended.
    Appended,
}

/// The stored RSVP for a phone number, if any.
pub async fn get_rsvp(
    store: &dyn SheetStore,
    spreadsheet_id: &str,
    sheet_name: &str,
    phone: &str,
) -> Result<Option<String>> {
    let phone = require(Some(phone), "phone number")?;
    let rows = store
        .get_values(
            spreadsheet_id,
            &format!("{}!{LOOKUP_RANGE}", quote_sheet_name(sheet_name)),
        )
        .await?;
    Ok(find_row_index(&rows, 0, phone).and_then(|i| non_empty_cell(&rows[i], 1)))
}

/// Record an RSVP, overwriting the existing answer for the phone number if there is one.
/// New rows leave the name blank for the sheet to fill in.
pub async fn save_rsvp(
    store: &dyn SheetStore,
    spreadsheet_id: &str,
    sheet_name: &str,
    phone: &str,
    rsvp: &str,
    now: DateTime<FixedOffset>,
) -> Result<RsvpWrite> {
    let phone = require(Some(phone), "phone")?;
    let rsvp = require(Some(rsvp), "RSVP value")?;
    let sheet = quote_sheet_name(sheet_name);

    let rows = store
        .get_values(spreadsheet_id, &format!("{sheet}!{LOOKUP_RANGE}"))
        .await?;

    if let Some(index) = find_row_index(&rows, 0, phone) {
        let row = index + FIRST_DATA_ROW;
        let col = column_index(RSVP_COLUMN).unwrap_or(4);
        store
            .update_values(
                spreadsheet_id,
                &format!("{sheet}!{}", cell(col, row)),
                vec![vec![rsvp.to_string()]],
            )
            .await?;
        info!("Updated RSVP for {phone} at row {row}");
        return Ok(RsvpWrite::Updated { row });
    }

    store
        .append_row(
            spreadsheet_id,
            &format!("{sheet}!{APPEND_RANGE}"),
            vec![
                format_sheet_timestamp(now),
                String::new(),
                phone.to_string(),
                rsvp.to_string(),
            ],
        )
        .await?;
    info!("Appended RSVP for {phone}");
    Ok(RsvpWrite::Appended)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CheckinError;
    use crate::sheets::MemorySheets;
    use chrono::TimeZone;

    fn now() -> DateTime<FixedOffset> {
        FixedOffset::east_opt(8 * 3600)
            .unwrap()
            .with_ymd_and_hms(2026, 3, 4, 18, 0, 0)
            .unwrap()
    }

    fn store() -> MemorySheets {
        MemorySheets::new().with_sheet(
            "s",
            "RSVP",
            &[
                &["Timestamp", "Name", "Contact Number", "RSVP"],
                &["", "Ada", "81110000", "Yes"],
                &["", "Linus", " 82220000 "],
            ],
        )
    }

    #[test_log::test(tokio::test)]
    async fn test_get_rsvp() {
        let s = store();
        assert_eq!(get_rsvp(&s, "s", "RSVP", "81110000").await.unwrap().as_deref(), Some("Yes"));
        assert_eq!(get_rsvp(&s, "s", "RSVP", "82220000").await.unwrap(), None);
        assert_eq!(get_rsvp(&s, "s", "RSVP", "89999999").await.unwrap(), None);
        assert!(matches!(
            get_rsvp(&s, "s", "RSVP", " ").await,
            Err(CheckinError::MissingField(_))
        ));
    }

    #[test_log::test(tokio::test)]
    async fn test_save_existing_updates_in_place() {
        let s = store();
        let write = save_rsvp(&s, "s", "RSVP", "82220000", "No", now()).await.unwrap();
        assert_eq!(write, RsvpWrite::Updated { row: 3 });
        let rows = s.rows("s", "RSVP");
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[2][3], "No");
    }

    #[test_log::test(tokio::test)]
    async fn test_save_new_appends_with_blank_name() {
        let s = store();
        let write = save_rsvp(&s, "s", "RSVP", "83330000", "Yes", now()).await.unwrap();
        assert_eq!(write, RsvpWrite::Appended);
        let rows = s.rows("s", "RSVP");
        assert_eq!(rows[3], vec!["3/4/2026, 6:00:00 PM", "", "83330000", "Yes"]);
    }

    #[test_log::test(tokio::test)]
    async fn test_save_requires_both_fields() {
        let s = store();
        assert!(save_rsvp(&s, "s", "RSVP", "", "Yes", now()).await.is_err());
        assert!(save_rsvp(&s, "s", "RSVP", "83330000", "", now()).await.is_err());
        assert_eq!(s.rows("s", "RSVP").len(), 3);
    }
}
