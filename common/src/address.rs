//! Mailing address confirmation against the donor sheet.
//!
//! Each recipient gets a link with a token stored in column `C`. Opening it
//! shows the address on file (`D:G`); the recipient either confirms it, which
//! sets `H` to `1`, or supplies a new one, which sets `H` to `changed` and
//! writes it to `I:L`.

use crate::a1::{cell, quote_sheet_name};
use crate::error::{CheckinError, Result, require};
use crate::sheets::{Row, SheetStore, ValueRange, cell_at, find_row_index, non_empty_cell};
use log::info;
use serde::{Deserialize, Serialize};

/// Read window; every position below is relative to column `B`.
const READ_RANGE: &str = "B2:Q";
const FIRST_DATA_ROW: usize = 2;

const NAME_IDX: usize = 0;
const TOKEN_IDX: usize = 1;
const OLD_ADDRESS_IDX: usize = 2;
const FLAG_IDX: usize = 6;
const NEW_ADDRESS_IDX: usize = 7;

// absolute 1-based columns for writes
const FLAG_COL: usize = 8;
const NEW_BLK_COL: usize = 9;
const NEW_POSTAL_COL: usize = 12;

pub const FLAG_CONFIRMED: &str = "1";
pub const FLAG_CHANGED: &str = "changed";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    #[serde(default)]
    pub blk: String,
    #[serde(default)]
    pub street: String,
    #[serde(default)]
    pub unit: String,
    #[serde(default)]
    pub postal: String,
}

impl Address {
    /// Read four consecutive cells starting at `start`.
    fn from_row(row: &[String], start: usize) -> Self {
        Self {
            blk: cell_at(row, start).to_string(),
            street: cell_at(row, start + 1).to_string(),
            unit: cell_at(row, start + 2).to_string(),
            postal: cell_at(row, start + 3).to_string(),
        }
    }

    pub fn is_blank(&self) -> bool {
        [&self.blk, &self.street, &self.unit, &self.postal]
            .iter()
            .all(|v| v.is_empty())
    }

    /// True when every field has a value.
    pub fn is_complete(&self) -> bool {
        [&self.blk, &self.street, &self.unit, &self.postal]
            .iter()
            .all(|v| !v.trim().is_empty())
    }

    fn into_row(self) -> Row {
        vec![self.blk, self.street, self.unit, self.postal]
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AddressStatus {
    pub h: Option<String>,
}

/// What the confirmation page shows for a token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AddressView {
    pub token: String,
    pub name: Option<String>,
    pub old: Address,
    pub status: AddressStatus,
    #[serde(rename = "newAddr")]
    pub new_addr: Option<Address>,
}

/// The recipient's answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddressDecision {
    Correct,
    Changed(Address),
}

impl AddressDecision {
    /// Validate the raw `decision` string and accompanying address.
    pub fn parse(decision: &str, new_address: Option<Address>) -> Result<Self> {
        match decision.trim() {
            "correct" => Ok(AddressDecision::Correct),
            "changed" => match new_address {
                Some(address) if address.is_complete() => Ok(AddressDecision::Changed(address)),
                _ => Err(CheckinError::MissingField("new address fields".to_string())),
            },
            _ => Err(CheckinError::Invalid("Invalid decision".to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AddressSaved {
    pub success: bool,
    pub h: String,
    #[serde(rename = "newAddr")]
    pub new_addr: Option<Address>,
}

/// Fetch the data rows and locate the token. Returns the rows and the match index.
async fn find_token(
    store: &dyn SheetStore,
    spreadsheet_id: &str,
    sheet_name: &str,
    token: &str,
) -> Result<(Vec<Row>, usize)> {
    let rows = store
        .get_values(
            spreadsheet_id,
            &format!("{}!{READ_RANGE}", quote_sheet_name(sheet_name)),
        )
        .await?;
    let index = find_row_index(&rows, TOKEN_IDX, token)
        .ok_or_else(|| CheckinError::NotFound("Not found".to_string()))?;
    Ok((rows, index))
}

pub async fn get_address(
    store: &dyn SheetStore,
    spreadsheet_id: &str,
    sheet_name: &str,
    token: &str,
) -> Result<AddressView> {
    let token = require(Some(token), "token")?;
    let (rows, index) = find_token(store, spreadsheet_id, sheet_name, token).await?;
    let row = &rows[index];

    let flag = row.get(FLAG_IDX).cloned();
    let confirmed = flag.as_deref().map(str::trim) == Some(FLAG_CONFIRMED);
    let new_addr = Address::from_row(row, NEW_ADDRESS_IDX);
    // a confirmed address has no replacement, whatever is left in the sheet
    let new_addr = if confirmed || new_addr.is_blank() {
        None
    } else {
        Some(new_addr)
    };

    Ok(AddressView {
        token: token.to_string(),
        name: non_empty_cell(row, NAME_IDX),
        old: Address::from_row(row, OLD_ADDRESS_IDX),
        status: AddressStatus { h: flag },
        new_addr,
    })
}

/// Store the recipient's decision as a single batch write of the flag and new address cells.
pub async fn confirm_address(
    store: &dyn SheetStore,
    spreadsheet_id: &str,
    sheet_name: &str,
    token: &str,
    decision: AddressDecision,
) -> Result<AddressSaved> {
    let token = require(Some(token), "token")?;
    let (_, index) = find_token(store, spreadsheet_id, sheet_name, token).await?;
    let row = index + FIRST_DATA_ROW;
    let sheet = quote_sheet_name(sheet_name);

    let flag_range = format!("{sheet}!{}", cell(FLAG_COL, row));
    let new_range = format!(
        "{sheet}!{}:{}",
        cell(NEW_BLK_COL, row),
        cell(NEW_POSTAL_COL, row)
    );

    let (flag, new_addr) = match decision {
        AddressDecision::Correct => (FLAG_CONFIRMED, None),
        AddressDecision::Changed(address) => (FLAG_CHANGED, Some(address)),
    };
    let new_values = new_addr.clone().unwrap_or_default().into_row();

    store
        .batch_update(
            spreadsheet_id,
            vec![
                ValueRange::new(flag_range, vec![vec![flag.to_string()]]),
                ValueRange::new(new_range, vec![new_values]),
            ],
        )
        .await?;
    info!("Address for token {token} at row {row} marked {flag}");

    Ok(AddressSaved {
        success: true,
        h: flag.to_string(),
        new_addr,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sheets::MemorySheets;
    use serde_json::json;

    fn store() -> MemorySheets {
        MemorySheets::new().with_sheet(
            "donors",
            "SEND",
            &[
                &["#", "Name", "Token", "Blk", "Street", "Unit", "Postal", "OK", "New Blk"],
                &["1", "Ada", "tok-a", "10", "Main St", "#01-01", "100010"],
                &["2", "Linus", " tok-b ", "20", "Side Rd", "#02-02", "200020", "1", "99", "Old", "#9", "999999"],
                &["3", "", "tok-c", "30", "Loop", "#03-03", "300030", "changed", "31", "New Loop", "#04-04", "310031"],
            ],
        )
    }

    #[test_log::test(tokio::test)]
    async fn test_get_unconfirmed_address() {
        let s = store();
        let view = get_address(&s, "donors", "SEND", "tok-a").await.unwrap();
        assert_eq!(
            serde_json::to_value(&view).unwrap(),
            json!({
                "token": "tok-a",
                "name": "Ada",
                "old": {"blk": "10", "street": "Main St", "unit": "#01-01", "postal": "100010"},
                "status": {"h": null},
                "newAddr": null
            })
        );
    }

    #[test_log::test(tokio::test)]
    async fn test_confirmed_flag_hides_leftover_new_address() {
        let s = store();
        let view = get_address(&s, "donors", "SEND", "tok-b").await.unwrap();
        assert_eq!(view.status.h.as_deref(), Some("1"));
        assert_eq!(view.new_addr, None);

        let changed = get_address(&s, "donors", "SEND", "tok-c").await.unwrap();
        assert_eq!(changed.name, None);
        assert_eq!(changed.new_addr.unwrap().street, "New Loop");
    }

    #[test_log::test(tokio::test)]
    async fn test_unknown_token_is_not_found() {
        let s = store();
        let err = get_address(&s, "donors", "SEND", "nope").await.unwrap_err();
        assert!(matches!(err, CheckinError::NotFound(_)));
    }

    #[test_log::test(tokio::test)]
    async fn test_confirm_correct_sets_flag_and_clears_new_address() {
        let s = store();
        let saved = confirm_address(&s, "donors", "SEND", "tok-c", AddressDecision::Correct)
            .await
            .unwrap();
        assert_eq!(saved.h, "1");
        assert_eq!(saved.new_addr, None);

        let rows = s.rows("donors", "SEND");
        assert_eq!(&rows[3][7..12], &["1", "", "", "", ""]);
    }

    #[test_log::test(tokio::test)]
    async fn test_confirm_changed_writes_new_address() {
        let s = store();
        let address = Address {
            blk: "11".into(),
            street: "North Ave".into(),
            unit: "#05-05".into(),
            postal: "110011".into(),
        };
        let saved = confirm_address(
            &s,
            "donors",
            "SEND",
            "tok-a",
            AddressDecision::Changed(address.clone()),
        )
        .await
        .unwrap();
        assert_eq!(saved.h, "changed");
        assert_eq!(saved.new_addr, Some(address));

        let rows = s.rows("donors", "SEND");
        assert_eq!(&rows[1][7..12], &["changed", "11", "North Ave", "#05-05", "110011"]);
    }

    #[test]
    fn test_decision_validation() {
        assert_eq!(AddressDecision::parse(" correct ", None).unwrap(), AddressDecision::Correct);
        assert!(matches!(
            AddressDecision::parse("maybe", None),
            Err(CheckinError::Invalid(_))
        ));
        let partial = Address {
            blk: "1".into(),
            street: "x".into(),
            unit: String::new(),
            postal: "2".into(),
        };
        assert!(matches!(
            AddressDecision::parse("changed", Some(partial)),
            Err(CheckinError::MissingField(_))
        ));
        assert!(AddressDecision::parse("changed", None).is_err());
    }
}
