//! Statement execution
//!
//! `SqlEngine` binds table names to a pair of files in the data directory:
//! `<table>.tbl` (heap) and `<table>.idx` (B+Tree index). `LOAD` appends
//! parsed tuples to the heap and optionally builds the index alongside;
//! `SELECT` normalises key conditions into a scan plan and answers through
//! the index when it can, falling back to a linear heap scan otherwise.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use anyhow::Context;
use tracing::debug;

use relbase_engine::{BTreeIndex, Error, OpenMode, RecordFile};

use crate::sql::{Attr, CompOp, Cond, CondAttr, Statement};

/// Normalised key conditions of a `SELECT`: an effective inclusive key
/// range plus `<>` exclusions. `bounded` records whether any non-`<>` key
/// condition was present, which is what makes the index usable.
#[derive(Debug, Clone, PartialEq)]
struct KeyPlan {
    /// Inclusive lower bound (widened to i64 so exclusive bounds at the
    /// i32 extremes stay representable)
    lo: i64,
    /// Inclusive upper bound
    hi: i64,
    /// Keys excluded by `<>`
    ne: Vec<i32>,
    /// Whether the plan can drive an index scan
    bounded: bool,
}

impl KeyPlan {
    fn from_conds(conds: &[(CompOp, i32)]) -> KeyPlan {
        let mut plan = KeyPlan {
            lo: i32::MIN as i64,
            hi: i32::MAX as i64,
            ne: Vec::new(),
            bounded: false,
        };
        for &(op, v) in conds {
            let v = v as i64;
            match op {
                CompOp::Eq => {
                    plan.lo = plan.lo.max(v);
                    plan.hi = plan.hi.min(v);
                    plan.bounded = true;
                }
                CompOp::Gt => {
                    plan.lo = plan.lo.max(v + 1);
                    plan.bounded = true;
                }
                CompOp::Ge => {
                    plan.lo = plan.lo.max(v);
                    plan.bounded = true;
                }
                CompOp::Lt => {
                    plan.hi = plan.hi.min(v - 1);
                    plan.bounded = true;
                }
                CompOp::Le => {
                    plan.hi = plan.hi.min(v);
                    plan.bounded = true;
                }
                CompOp::Ne => plan.ne.push(v as i32),
            }
        }
        plan
    }

    /// True when no key can satisfy the range.
    fn is_empty(&self) -> bool {
        self.lo > self.hi
    }

    fn admits(&self, key: i32) -> bool {
        let k = key as i64;
        k >= self.lo && k <= self.hi && !self.ne.contains(&key)
    }
}

/// Executes parsed statements against a data directory
pub struct SqlEngine {
    data_dir: PathBuf,
}

impl SqlEngine {
    pub fn new(data_dir: PathBuf) -> Self {
        SqlEngine { data_dir }
    }

    /// Execute one statement. `Quit` is the caller's concern.
    pub fn execute(&self, stmt: Statement) -> anyhow::Result<()> {
        match stmt {
            Statement::Load {
                table,
                file,
                with_index,
            } => self.load(&table, &file, with_index),
            Statement::Select { attr, table, conds } => self.select(attr, &table, &conds),
            Statement::Quit => Ok(()),
        }
    }

    fn table_path(&self, table: &str) -> PathBuf {
        self.data_dir.join(format!("{table}.tbl"))
    }

    fn index_path(&self, table: &str) -> PathBuf {
        self.data_dir.join(format!("{table}.idx"))
    }

    /// `LOAD <table> FROM '<file>' [WITH INDEX]`
    pub fn load(&self, table: &str, file: &str, with_index: bool) -> anyhow::Result<()> {
        let table_path = self.table_path(table);
        let index_path = self.index_path(table);

        let load_path = Path::new(file);
        let load_file = File::open(load_path).map_err(|source| Error::FileOpen {
            path: load_path.to_path_buf(),
            source,
        })?;

        // a pre-existing table without an index never gains a partial one
        let build_index = with_index && !(table_path.exists() && !index_path.exists());

        let mut records = RecordFile::open(&table_path, OpenMode::Write)?;
        let mut index = if build_index {
            Some(BTreeIndex::open(&index_path, OpenMode::Write)?)
        } else {
            None
        };

        let mut loaded = 0usize;
        for line in BufReader::new(load_file).lines() {
            let line = line.map_err(Error::FileRead)?;
            let (key, value) = parse_load_line(&line)?;
            let rid = records.append(key, &value)?;
            if let Some(idx) = index.as_mut() {
                idx.insert(key, rid)?;
            }
            loaded += 1;
        }

        if let Some(idx) = index {
            idx.close()?;
        }
        records.close()?;
        debug!(table, loaded, indexed = build_index, "load complete");
        Ok(())
    }

    /// `SELECT <attr> FROM <table> [WHERE ...]`
    pub fn select(&self, attr: Attr, table: &str, conds: &[Cond]) -> anyhow::Result<()> {
        let need_value = matches!(attr, Attr::Value | Attr::All)
            || conds.iter().any(|c| c.attr == CondAttr::Value);
        let rows = self.evaluate(table, conds, need_value)?;

        match attr {
            Attr::Key => {
                for (key, _) in &rows {
                    println!("{key}");
                }
            }
            Attr::Value => {
                for (_, value) in &rows {
                    println!("{}", value.as_deref().unwrap_or_default());
                }
            }
            Attr::All => {
                for (key, value) in &rows {
                    println!("{key} '{}'", value.as_deref().unwrap_or_default());
                }
            }
            Attr::Count => println!("{}", rows.len()),
        }
        Ok(())
    }

    /// Collect the `(key, value)` tuples matching `conds`. Values are read
    /// from the heap only when `need_value` asks for them. Index-driven
    /// evaluation yields key order; linear scans yield heap order.
    fn evaluate(
        &self,
        table: &str,
        conds: &[Cond],
        need_value: bool,
    ) -> anyhow::Result<Vec<(i32, Option<String>)>> {
        let mut records = RecordFile::open(self.table_path(table), OpenMode::Read)
            .with_context(|| format!("table {table} does not exist"))?;

        let mut key_conds = Vec::new();
        let mut value_conds = Vec::new();
        for cond in conds {
            match cond.attr {
                CondAttr::Key => {
                    let v: i32 = cond.value.parse().with_context(|| {
                        format!("key condition needs an integer, got '{}'", cond.value)
                    })?;
                    key_conds.push((cond.op, v));
                }
                CondAttr::Value => value_conds.push((cond.op, cond.value.clone())),
            }
        }

        let plan = KeyPlan::from_conds(&key_conds);
        if plan.is_empty() {
            return Ok(Vec::new());
        }

        if plan.bounded {
            if let Ok(mut index) = BTreeIndex::open(self.index_path(table), OpenMode::Read) {
                debug!(table, ?plan, "using index scan");
                return index_scan(&mut index, &mut records, &plan, need_value, &value_conds);
            }
        }

        debug!(table, "using linear scan");
        linear_scan(&mut records, &key_conds, &value_conds)
    }
}

/// Scan the index from the plan's lower bound to its upper bound, applying
/// `<>` exclusions and value conditions post-hoc.
fn index_scan(
    index: &mut BTreeIndex,
    records: &mut RecordFile,
    plan: &KeyPlan,
    need_value: bool,
    value_conds: &[(CompOp, String)],
) -> anyhow::Result<Vec<(i32, Option<String>)>> {
    let mut rows = Vec::new();

    let start = plan.lo as i32;
    let mut cursor = match index.locate(start) {
        Ok(cursor) => cursor,
        Err(Error::NoSuchRecord) | Err(Error::EndOfTree) => return Ok(rows),
        Err(e) => return Err(e.into()),
    };

    loop {
        let (key, rid) = match index.read_forward(&mut cursor) {
            Ok(entry) => entry,
            Err(Error::EndOfTree) => break,
            Err(e) => return Err(e.into()),
        };
        if key as i64 > plan.hi {
            break;
        }
        if !plan.admits(key) {
            continue;
        }

        let value = if need_value {
            Some(records.read(rid)?.1)
        } else {
            None
        };
        if let Some(v) = &value {
            if !value_satisfies(v, value_conds) {
                continue;
            }
        }
        rows.push((key, value));
    }

    Ok(rows)
}

/// Scan the heap from the beginning, checking every condition per tuple.
fn linear_scan(
    records: &mut RecordFile,
    key_conds: &[(CompOp, i32)],
    value_conds: &[(CompOp, String)],
) -> anyhow::Result<Vec<(i32, Option<String>)>> {
    let mut rows = Vec::new();
    for item in records.scan() {
        let (_, key, value) = item?;
        if key_conds.iter().all(|&(op, v)| compare(op, key.cmp(&v)))
            && value_satisfies(&value, value_conds)
        {
            rows.push((key, Some(value)));
        }
    }
    Ok(rows)
}

fn value_satisfies(value: &str, conds: &[(CompOp, String)]) -> bool {
    conds
        .iter()
        .all(|(op, v)| compare(*op, value.cmp(v.as_str())))
}

fn compare(op: CompOp, ord: std::cmp::Ordering) -> bool {
    use std::cmp::Ordering::*;
    match op {
        CompOp::Eq => ord == Equal,
        CompOp::Ne => ord != Equal,
        CompOp::Lt => ord == Less,
        CompOp::Le => ord != Greater,
        CompOp::Gt => ord == Greater,
        CompOp::Ge => ord != Less,
    }
}

/// Parse one load-file line: `<int>, '<string>'`. Leading whitespace is
/// skipped, the comma is mandatory, the value may be quoted with `'` or `"`
/// or left bare, and an absent value yields the empty string.
pub fn parse_load_line(line: &str) -> Result<(i32, String), Error> {
    let s = line.trim_start();

    let digits_end = s
        .char_indices()
        .take_while(|&(i, c)| c.is_ascii_digit() || (i == 0 && (c == '-' || c == '+')))
        .map(|(i, c)| i + c.len_utf8())
        .last()
        .unwrap_or(0);
    let key: i32 = s[..digits_end]
        .parse()
        .map_err(|_| Error::InvalidFormat(format!("bad key in line '{line}'")))?;

    let rest = &s[digits_end..];
    let comma = rest
        .find(',')
        .ok_or_else(|| Error::InvalidFormat(format!("missing comma in line '{line}'")))?;
    let mut value = rest[comma + 1..].trim_start();

    if value.is_empty() {
        return Ok((key, String::new()));
    }

    let value = match value.chars().next() {
        Some(quote @ ('\'' | '"')) => {
            value = &value[1..];
            match value.find(quote) {
                Some(end) => &value[..end],
                None => value,
            }
        }
        _ => value.trim_end_matches('\n'),
    };

    Ok((key, value.to_string()))
}
