//! 设置存储
//!
//! 不透明的键值存储，值为 JSON。管道读取 `enabled`，写入计数和历史记录，
//! 不负责存储本身的生命周期。

use std::cell::RefCell;
use std::collections::HashMap;
use std::path::Path;
use std::rc::Rc;

use redb::{Database, ReadableTable, TableDefinition, TableError};
use serde_json::Value;

use super::history::HistoryEntry;
use crate::moderation::config::constants;
use crate::moderation::error::{ModerationError, ModerationResult};

const SETTINGS: TableDefinition<&str, &[u8]> = TableDefinition::new("settings");

/// 键值存储接口
pub trait SettingsStore {
    fn get(&self, key: &str) -> ModerationResult<Option<Value>>;

    fn set(&self, key: &str, value: Value) -> ModerationResult<()>;

    /// 保护是否启用，未设置时为 `None`
    fn enabled(&self) -> ModerationResult<Option<bool>> {
        Ok(self.get(constants::KEY_ENABLED)?.and_then(|v| v.as_bool()))
    }

    fn set_enabled(&self, enabled: bool) -> ModerationResult<()> {
        self.set(constants::KEY_ENABLED, Value::Bool(enabled))
    }

    /// 读取计数，缺失或类型不符时为 0
    fn counter(&self, key: &str) -> ModerationResult<usize> {
        Ok(self
            .get(key)?
            .and_then(|v| v.as_u64())
            .map(|n| n as usize)
            .unwrap_or(0))
    }

    fn set_counter(&self, key: &str, value: usize) -> ModerationResult<()> {
        self.set(key, Value::from(value as u64))
    }

    /// 读取历史记录；格式不符时丢弃并返回空
    fn history(&self) -> ModerationResult<Vec<HistoryEntry>> {
        match self.get(constants::KEY_FILTER_HISTORY)? {
            Some(value) => match serde_json::from_value(value) {
                Ok(entries) => Ok(entries),
                Err(e) => {
                    tracing::warn!("持久化的历史记录格式无效，已忽略: {}", e);
                    Ok(Vec::new())
                }
            },
            None => Ok(Vec::new()),
        }
    }

    fn set_history(&self, entries: &[HistoryEntry]) -> ModerationResult<()> {
        self.set(constants::KEY_FILTER_HISTORY, serde_json::to_value(entries)?)
    }
}

impl<T: SettingsStore + ?Sized> SettingsStore for Rc<T> {
    fn get(&self, key: &str) -> ModerationResult<Option<Value>> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: Value) -> ModerationResult<()> {
        (**self).set(key, value)
    }
}

/// 内存存储
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: RefCell<HashMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_values<I>(values: I) -> Self
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        Self {
            values: RefCell::new(values.into_iter().collect()),
        }
    }
}

impl SettingsStore for MemoryStore {
    fn get(&self, key: &str) -> ModerationResult<Option<Value>> {
        Ok(self.values.borrow().get(key).cloned())
    }

    fn set(&self, key: &str, value: Value) -> ModerationResult<()> {
        self.values.borrow_mut().insert(key.to_string(), value);
        Ok(())
    }
}

/// 基于 redb 的磁盘存储
pub struct RedbStore {
    db: Database,
}

impl RedbStore {
    /// 打开或创建数据库文件
    pub fn open<P: AsRef<Path>>(path: P) -> ModerationResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    ModerationError::StorageError(format!("创建存储目录失败: {}", e))
                })?;
            }
        }

        let db = Database::create(path)
            .map_err(|e| ModerationError::StorageError(format!("打开存储失败: {}", e)))?;
        tracing::debug!("已打开设置存储: {}", path.display());

        Ok(Self { db })
    }

    fn read_raw(&self, key: &str) -> Result<Option<Vec<u8>>, redb::Error> {
        let txn = self.db.begin_read()?;
        let table = match txn.open_table(SETTINGS) {
            Ok(table) => table,
            Err(TableError::TableDoesNotExist(_)) => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(table.get(key)?.map(|guard| guard.value().to_vec()))
    }

    fn write_raw(&self, key: &str, value: &[u8]) -> Result<(), redb::Error> {
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(SETTINGS)?;
            table.insert(key, value)?;
        }
        txn.commit()?;
        Ok(())
    }
}

impl SettingsStore for RedbStore {
    fn get(&self, key: &str) -> ModerationResult<Option<Value>> {
        match self.read_raw(key)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn set(&self, key: &str, value: Value) -> ModerationResult<()> {
        let bytes = serde_json::to_vec(&value)?;
        self.write_raw(key, &bytes)?;
        Ok(())
    }
}
