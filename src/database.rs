use csv::ByteRecord;
use serde::Serialize;
use std::borrow::Cow;
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

use crate::achievements::Badge;
use crate::error::{StoreError, StoreResult};
use crate::ledger::{timestamp, GroupRecord, Transaction};
use crate::rank::xp_from_f64;

/// Full-table persistence for group records.
///
/// `save` always overwrites everything with the given records. There is no
/// row versioning, so two writers doing read-modify-write concurrently lose
/// the earlier update.
pub trait GroupStore: Send + Sync {
    fn fetch_all(&self) -> StoreResult<Vec<GroupRecord>>;
    fn save(&self, records: &[GroupRecord]) -> StoreResult<()>;
}

impl GroupStore for Box<dyn GroupStore> {
    fn fetch_all(&self) -> StoreResult<Vec<GroupRecord>> {
        (**self).fetch_all()
    }

    fn save(&self, records: &[GroupRecord]) -> StoreResult<()> {
        (**self).save(records)
    }
}

impl<T: GroupStore + ?Sized> GroupStore for Arc<T> {
    fn fetch_all(&self) -> StoreResult<Vec<GroupRecord>> {
        (**self).fetch_all()
    }

    fn save(&self, records: &[GroupRecord]) -> StoreResult<()> {
        (**self).save(records)
    }
}

const SHEET_HEADERS: [&str; 7] = [
    "Room",
    "GroupName",
    "XP",
    "Members",
    "LastUpdated",
    "History",
    "Badges",
];

/// One spreadsheet row. Every cell is read as text so a bad value only
/// affects its own column.
#[derive(Debug, Serialize, Default)]
struct SheetRow {
    #[serde(rename = "Room")]
    room: String,
    #[serde(rename = "GroupName")]
    group_name: String,
    #[serde(rename = "XP")]
    xp: String,
    #[serde(rename = "Members")]
    members: String,
    #[serde(rename = "LastUpdated")]
    last_updated: String,
    #[serde(rename = "History")]
    history: String,
    #[serde(rename = "Badges")]
    badges: String,
}

impl SheetRow {
    /// Map raw cells onto columns by header name. Missing cells stay empty
    /// and bytes that are not UTF-8 are replaced, so every row survives.
    fn from_byte_record(headers: &ByteRecord, raw: &ByteRecord, line: u64) -> Self {
        let mut row = SheetRow::default();
        for (header, cell) in headers.iter().zip(raw.iter()) {
            let value = match String::from_utf8_lossy(cell) {
                Cow::Borrowed(text) => text.to_string(),
                Cow::Owned(text) => {
                    warn!(line, column = %String::from_utf8_lossy(header), "undecodable bytes in sheet cell, replaced");
                    text
                }
            };
            let slot = match String::from_utf8_lossy(header).trim() {
                "Room" => &mut row.room,
                "GroupName" => &mut row.group_name,
                "XP" => &mut row.xp,
                "Members" => &mut row.members,
                "LastUpdated" => &mut row.last_updated,
                "History" => &mut row.history,
                "Badges" => &mut row.badges,
                _ => continue,
            };
            *slot = value;
        }
        row
    }

    fn is_blank(&self) -> bool {
        self.room.trim().is_empty() && self.group_name.trim().is_empty()
    }

    fn into_record(self) -> GroupRecord {
        let xp = coerce_xp(&self.xp);
        let history = parse_history(&self.history);
        let badges = parse_badges(&self.badges);
        let last_updated = timestamp::parse(&self.last_updated);

        GroupRecord::from_stored(
            self.room,
            self.group_name,
            self.members,
            xp,
            history,
            badges,
            last_updated,
        )
    }

    fn from_record(record: &GroupRecord) -> StoreResult<Self> {
        let badge_ids: Vec<&str> = record.badges().iter().map(|b| b.id()).collect();
        Ok(SheetRow {
            room: record.room.clone(),
            group_name: record.group_name.clone(),
            xp: record.xp().to_string(),
            members: record.members.clone(),
            last_updated: record
                .last_updated
                .as_ref()
                .map(timestamp::format)
                .unwrap_or_default(),
            history: serde_json::to_string(record.history())?,
            badges: serde_json::to_string(&badge_ids)?,
        })
    }
}

pub fn coerce_xp(raw: &str) -> i64 {
    let raw = raw.trim();
    if raw.is_empty() {
        return 0;
    }
    if let Ok(xp) = raw.parse::<i64>() {
        return xp;
    }
    match raw.parse::<f64>() {
        Ok(value) => xp_from_f64(value),
        Err(_) => {
            warn!(value = raw, "malformed score cell, treating as 0");
            0
        }
    }
}

pub fn parse_history(raw: &str) -> Vec<Transaction> {
    if raw.trim().is_empty() {
        return Vec::new();
    }
    serde_json::from_str(raw).unwrap_or_else(|e| {
        warn!(error = %e, "malformed history column, treating as empty");
        Vec::new()
    })
}

pub fn parse_badges(raw: &str) -> BTreeSet<Badge> {
    if raw.trim().is_empty() {
        return BTreeSet::new();
    }
    match serde_json::from_str::<Vec<String>>(raw) {
        Ok(ids) => ids
            .iter()
            .filter_map(|id| Badge::ALL.iter().copied().find(|b| b.id() == id))
            .collect(),
        Err(e) => {
            warn!(error = %e, "malformed badges column, treating as empty");
            BTreeSet::new()
        }
    }
}

/// Spreadsheet-style store backed by a single CSV file.
pub struct CsvGroupStore {
    path: PathBuf,
}

impl CsvGroupStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        CsvGroupStore { path: path.into() }
    }
}

impl GroupStore for CsvGroupStore {
    fn fetch_all(&self) -> StoreResult<Vec<GroupRecord>> {
        if !self.path.exists() {
            debug!(path = ?self.path, "sheet does not exist yet");
            return Ok(Vec::new());
        }

        let mut rdr = csv::ReaderBuilder::new()
            .flexible(true)
            .from_path(&self.path)?;

        let headers = rdr.byte_headers()?.clone();
        let mut raw = ByteRecord::new();
        let mut records = Vec::new();
        while rdr.read_byte_record(&mut raw)? {
            let line = raw.position().map(|p| p.line()).unwrap_or_default();
            let row = SheetRow::from_byte_record(&headers, &raw, line);
            if !row.is_blank() {
                records.push(row.into_record());
            }
        }

        debug!(path = ?self.path, count = records.len(), "sheet loaded");
        Ok(records)
    }

    fn save(&self, records: &[GroupRecord]) -> StoreResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let tmp = self.path.with_extension("csv.tmp");
        {
            let mut wtr = csv::WriterBuilder::new()
                .has_headers(false)
                .from_path(&tmp)?;
            wtr.write_record(SHEET_HEADERS)?;
            for record in records {
                wtr.serialize(SheetRow::from_record(record)?)?;
            }
            wtr.flush()?;
        }
        std::fs::rename(&tmp, &self.path)?;

        debug!(path = ?self.path, count = records.len(), "sheet written");
        Ok(())
    }
}

/// In-process store. `set_available(false)` makes every call fail as an
/// unreachable backend would.
#[derive(Default)]
pub struct MemoryGroupStore {
    records: Mutex<Vec<GroupRecord>>,
    unavailable: AtomicBool,
}

impl MemoryGroupStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: Vec<GroupRecord>) -> Self {
        MemoryGroupStore {
            records: Mutex::new(records),
            unavailable: AtomicBool::new(false),
        }
    }

    pub fn set_available(&self, available: bool) {
        self.unavailable.store(!available, Ordering::SeqCst);
    }

    fn check(&self) -> StoreResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("memory store switched off".to_string()))
        } else {
            Ok(())
        }
    }
}

impl GroupStore for MemoryGroupStore {
    fn fetch_all(&self) -> StoreResult<Vec<GroupRecord>> {
        self.check()?;
        let records = self
            .records
            .lock()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".to_string()))?;
        Ok(records.clone())
    }

    fn save(&self, records: &[GroupRecord]) -> StoreResult<()> {
        self.check()?;
        let mut stored = self
            .records
            .lock()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".to_string()))?;
        *stored = records.to_vec();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::Ledger;
    use chrono::NaiveDate;

    fn temp_sheet() -> PathBuf {
        std::env::temp_dir()
            .join(format!("scoreboard-{}", ulid::Ulid::new()))
            .join("sheet.csv")
    }

    #[test]
    fn test_missing_file_is_empty() {
        let store = CsvGroupStore::new(temp_sheet());
        assert!(store.fetch_all().unwrap().is_empty());
    }

    #[test]
    fn test_header_only_sheet_is_empty() {
        let path = temp_sheet();
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "Room,GroupName,XP,Members,LastUpdated\n").unwrap();

        let store = CsvGroupStore::new(&path);
        assert!(store.fetch_all().unwrap().is_empty());
    }

    #[test]
    fn test_save_then_fetch_keeps_ledger_state() {
        let ledger = Ledger::default();
        let at = NaiveDate::from_ymd_opt(2024, 6, 1)
            .and_then(|d| d.and_hms_opt(9, 30, 0))
            .unwrap();
        let group = GroupRecord::new("ม.1/1", "Tigers", "1, 2, \"3\"", at);
        let (_, group) = ledger.apply_at(&group, 120, "project, part 1", at).unwrap();
        let (_, group) = ledger.apply_at(&group, -30, "late", at).unwrap();

        let store = CsvGroupStore::new(temp_sheet());
        store.save(&[group.clone()]).unwrap();
        let loaded = store.fetch_all().unwrap();

        assert_eq!(loaded, vec![group]);
    }

    #[test]
    fn test_legacy_and_malformed_columns_are_coerced() {
        let path = temp_sheet();
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(
            &path,
            "Room,GroupName,XP,Members,LastUpdated,History,Badges\n\
             ม.1/1,Old,350.0,a b,2024-01-02 03:04:05,,\n\
             ม.1/1,Broken,abc,,,not json,[oops\n\
             ,,,,,,\n\
             ม.1/2,Short,10\n",
        )
        .unwrap();

        let records = CsvGroupStore::new(&path).fetch_all().unwrap();
        assert_eq!(records.len(), 3);

        assert_eq!(records[0].xp(), 350);
        assert_eq!(records[0].history().len(), 1);

        assert_eq!(records[1].xp(), 0);
        assert!(records[1].history().is_empty());
        assert!(records[1].badges().is_empty());
        assert_eq!(records[1].last_updated, None);

        assert_eq!(records[2].group_name, "Short");
        assert_eq!(records[2].xp(), 10);
    }

    #[test]
    fn test_undecodable_cells_survive_a_save() {
        let path = temp_sheet();
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        let mut sheet = "Room,GroupName,XP,Members\n\
                         ม.1/1,A,10\n\
                         ม.1/1,B,500,"
            .as_bytes()
            .to_vec();
        sheet.extend_from_slice(&[0xFF, 0xFE, b'\n']);
        std::fs::write(&path, sheet).unwrap();

        let store = CsvGroupStore::new(&path);
        let records = store.fetch_all().unwrap();
        let names: Vec<&str> = records.iter().map(|r| r.group_name.as_str()).collect();
        assert_eq!(names, vec!["A", "B"]);
        assert_eq!(records[1].xp(), 500);
        assert_eq!(records[1].members, "\u{FFFD}\u{FFFD}");

        store.save(&records).unwrap();
        let reloaded = store.fetch_all().unwrap();
        assert_eq!(reloaded.len(), 2);
        assert_eq!(reloaded[1].group_name, "B");
        assert_eq!(reloaded[1].xp(), 500);
    }

    #[test]
    fn test_short_and_malformed_rows_survive_a_save() {
        let path = temp_sheet();
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(
            &path,
            "Room,GroupName,XP,Members,LastUpdated,History,Badges\n\
             ม.1/1,Short\n\
             ม.1/1,Broken,abc,,,{not json,\n\
             ม.1/2,Legacy,75\n",
        )
        .unwrap();

        let store = CsvGroupStore::new(&path);
        store.save(&store.fetch_all().unwrap()).unwrap();
        let records = store.fetch_all().unwrap();

        let summary: Vec<(&str, i64)> = records
            .iter()
            .map(|r| (r.group_name.as_str(), r.xp()))
            .collect();
        assert_eq!(summary, vec![("Short", 0), ("Broken", 0), ("Legacy", 75)]);
        assert_eq!(records[2].history().len(), 1);
    }

    #[test]
    fn test_unknown_badge_ids_are_dropped() {
        let badges = parse_badges(r#"["first_blood","golden_apple","phoenix"]"#);
        assert_eq!(badges, BTreeSet::from([Badge::FirstBlood, Badge::Phoenix]));
    }

    #[test]
    fn test_coerce_xp() {
        assert_eq!(coerce_xp(" 42 "), 42);
        assert_eq!(coerce_xp("-7"), -7);
        assert_eq!(coerce_xp("12.9"), 12);
        assert_eq!(coerce_xp("NaN"), 0);
        assert_eq!(coerce_xp(""), 0);
        assert_eq!(coerce_xp("n/a"), 0);
    }

    #[test]
    fn test_memory_store_outage() {
        let store = MemoryGroupStore::new();
        store.set_available(false);
        assert!(matches!(store.fetch_all(), Err(StoreError::Unavailable(_))));
        assert!(matches!(store.save(&[]), Err(StoreError::Unavailable(_))));
        store.set_available(true);
        assert!(store.fetch_all().unwrap().is_empty());
    }
}
