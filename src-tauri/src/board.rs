//! Kanban task board for the admin dashboard.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{ConsoleError, Result};
use crate::storage::SlotStore;

pub const DEFAULT_BOARD_KEY: &str = "kanbanBoard";

const COLUMN_NAME_MAX: usize = 60;
const TASK_TITLE_MAX: usize = 120;
const TASK_DESCRIPTION_MAX: usize = 2_000;
const DEFAULT_COLUMNS: [(&str, &str); 4] = [
    ("todo", "To Do"),
    ("in_progress", "In Progress"),
    ("review", "Review"),
    ("done", "Done"),
];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub id: String,
    pub name: String,
    pub order: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskCard {
    pub id: String,
    pub column_id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub priority: Priority,
    pub order: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewTask {
    pub column_id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub priority: Option<Priority>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Board {
    pub columns: Vec<Column>,
    pub tasks: Vec<TaskCard>,
    #[serde(default)]
    next_seq: u64,
}

/// Trims, drops control characters and caps the length in chars.
pub fn clamp_text(value: &str, max_len: usize, trim: bool) -> String {
    let source = if trim { value.trim() } else { value };
    source
        .chars()
        .filter(|ch| {
            let code = *ch as u32;
            code >= 32 && code != 127
        })
        .take(max_len)
        .collect()
}

impl Board {
    pub fn with_default_columns(now: DateTime<Utc>) -> Self {
        let columns = DEFAULT_COLUMNS
            .iter()
            .enumerate()
            .map(|(idx, (id, name))| Column {
                id: id.to_string(),
                name: name.to_string(),
                order: idx as i64 + 1,
                created_at: now,
            })
            .collect();
        Self {
            columns,
            tasks: Vec::new(),
            next_seq: 0,
        }
    }

    fn new_id(&mut self, prefix: &str, now: &DateTime<Utc>) -> String {
        self.next_seq += 1;
        format!("{prefix}-{}-{}", now.timestamp_millis(), self.next_seq)
    }

    fn has_column(&self, column_id: &str) -> bool {
        self.columns.iter().any(|col| col.id == column_id)
    }

    fn next_task_order(&self, column_id: &str) -> i64 {
        self.tasks
            .iter()
            .filter(|task| task.column_id == column_id)
            .map(|task| task.order)
            .max()
            .unwrap_or(0)
            + 1
    }

    pub fn add_column(&mut self, name: &str, now: DateTime<Utc>) -> Result<Column> {
        let name = clamp_text(name, COLUMN_NAME_MAX, true);
        if name.is_empty() {
            return Err(ConsoleError::validation("Column name is required."));
        }
        let max_order = self.columns.iter().map(|col| col.order).max().unwrap_or(0);
        let column = Column {
            id: self.new_id("col", &now),
            name,
            order: max_order + 1,
            created_at: now,
        };
        self.columns.push(column.clone());
        Ok(column)
    }

    /// Removes the column together with its tasks; returns how many tasks went.
    pub fn remove_column(&mut self, column_id: &str) -> Result<usize> {
        if !self.has_column(column_id) {
            return Err(ConsoleError::not_found("column", column_id));
        }
        self.columns.retain(|col| col.id != column_id);
        let before = self.tasks.len();
        self.tasks.retain(|task| task.column_id != column_id);
        Ok(before - self.tasks.len())
    }

    pub fn add_task(&mut self, fields: NewTask, now: DateTime<Utc>) -> Result<TaskCard> {
        let column_id = clamp_text(&fields.column_id, 128, true);
        if !self.has_column(&column_id) {
            return Err(ConsoleError::not_found("column", column_id));
        }
        let title = clamp_text(&fields.title, TASK_TITLE_MAX, true);
        if title.is_empty() {
            return Err(ConsoleError::validation("Task title is required."));
        }
        let task = TaskCard {
            id: self.new_id("task", &now),
            order: self.next_task_order(&column_id),
            column_id,
            title,
            description: clamp_text(
                fields.description.as_deref().unwrap_or_default(),
                TASK_DESCRIPTION_MAX,
                false,
            ),
            priority: fields.priority.unwrap_or_default(),
            created_at: now,
            updated_at: now,
        };
        self.tasks.push(task.clone());
        Ok(task)
    }

    /// Drop semantics: the task goes to the end of the target column.
    pub fn move_task(&mut self, task_id: &str, column_id: &str, now: DateTime<Utc>) -> Result<TaskCard> {
        if !self.has_column(column_id) {
            return Err(ConsoleError::not_found("column", column_id));
        }
        let order = self.next_task_order(column_id);
        let Some(task) = self.tasks.iter_mut().find(|task| task.id == task_id) else {
            return Err(ConsoleError::not_found("task", task_id));
        };
        if task.column_id != column_id {
            task.column_id = column_id.to_string();
            task.order = order;
            task.updated_at = now;
        }
        Ok(task.clone())
    }

    /// Listed ids first, in the given order; unknown and repeated ids are
    /// skipped; the rest keep their relative order. Orders restart at 1.
    pub fn reorder_column(
        &mut self,
        column_id: &str,
        ordered_ids: &[String],
        now: DateTime<Utc>,
    ) -> Result<Vec<TaskCard>> {
        if !self.has_column(column_id) {
            return Err(ConsoleError::not_found("column", column_id));
        }

        let mut column_tasks: Vec<&TaskCard> = self
            .tasks
            .iter()
            .filter(|task| task.column_id == column_id)
            .collect();
        column_tasks.sort_by_key(|task| task.order);
        let known: HashSet<&str> = column_tasks.iter().map(|task| task.id.as_str()).collect();

        let mut ordered: Vec<String> = Vec::new();
        let mut seen = HashSet::new();
        for id in ordered_ids {
            let id = id.trim();
            if known.contains(id) && seen.insert(id.to_string()) {
                ordered.push(id.to_string());
            }
        }
        for task in &column_tasks {
            if !seen.contains(&task.id) {
                ordered.push(task.id.clone());
            }
        }

        let order_by_id: HashMap<String, i64> = ordered
            .into_iter()
            .enumerate()
            .map(|(idx, id)| (id, idx as i64 + 1))
            .collect();
        for task in self.tasks.iter_mut() {
            if let Some(next_order) = order_by_id.get(&task.id).copied() {
                if task.order != next_order {
                    task.order = next_order;
                    task.updated_at = now;
                }
            }
        }
        Ok(self.tasks_in(column_id))
    }

    pub fn delete_task(&mut self, task_id: &str) -> bool {
        let before = self.tasks.len();
        self.tasks.retain(|task| task.id != task_id);
        before != self.tasks.len()
    }

    pub fn tasks_in(&self, column_id: &str) -> Vec<TaskCard> {
        let mut tasks: Vec<TaskCard> = self
            .tasks
            .iter()
            .filter(|task| task.column_id == column_id)
            .cloned()
            .collect();
        tasks.sort_by_key(|task| task.order);
        tasks
    }

    pub fn column_counts(&self) -> Vec<(String, usize)> {
        let mut columns: Vec<&Column> = self.columns.iter().collect();
        columns.sort_by_key(|col| col.order);
        columns
            .into_iter()
            .map(|col| {
                let count = self.tasks.iter().filter(|task| task.column_id == col.id).count();
                (col.id.clone(), count)
            })
            .collect()
    }

    pub fn column_name(&self, column_id: &str) -> Option<&str> {
        self.columns
            .iter()
            .find(|col| col.id == column_id)
            .map(|col| col.name.as_str())
    }
}

/// Keeps a `Board` in one slot and rewrites it after each mutation.
pub struct BoardStore<S: SlotStore> {
    slots: S,
    key: String,
    board: Board,
}

impl<S: SlotStore> BoardStore<S> {
    pub fn open(slots: S, key: impl Into<String>, now: DateTime<Utc>) -> Result<Self> {
        let key = key.into();
        let decoded = match slots.get(&key) {
            Ok(Some(raw)) => serde_json::from_str::<Board>(&raw).map(Some).map_err(|err| err.to_string()),
            Ok(None) => Ok(None),
            Err(err) if err.is_corrupt() => Err(err.to_string()),
            Err(err) => return Err(err.into()),
        };
        let board = match decoded {
            Ok(Some(board)) => board,
            Ok(None) => return Ok(Self::fresh(slots, key, now)),
            Err(reason) => {
                warn!("board snapshot unreadable, starting with default columns: {reason}");
                if let Err(err) = slots.quarantine(&key) {
                    warn!("failed to quarantine board snapshot: {err}");
                }
                return Ok(Self::fresh(slots, key, now));
            }
        };
        Ok(Self { slots, key, board })
    }

    /// A store holding only the default columns. Nothing is written until
    /// the first mutation.
    pub fn fresh(slots: S, key: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            slots,
            key: key.into(),
            board: Board::with_default_columns(now),
        }
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    /// Applies `op` and persists; the change stays in memory even if the
    /// write fails.
    pub fn mutate<T>(&mut self, op: impl FnOnce(&mut Board) -> Result<T>) -> Result<T> {
        let out = op(&mut self.board)?;
        let content = serde_json::to_string(&self.board)?;
        self.slots.set(&self.key, &content)?;
        Ok(out)
    }

    pub fn add_column(&mut self, name: &str, now: DateTime<Utc>) -> Result<Column> {
        self.mutate(|board| board.add_column(name, now))
    }

    pub fn remove_column(&mut self, column_id: &str) -> Result<usize> {
        self.mutate(|board| board.remove_column(column_id))
    }

    pub fn add_task(&mut self, fields: NewTask, now: DateTime<Utc>) -> Result<TaskCard> {
        let task = self.mutate(|board| board.add_task(fields, now))?;
        info!(task = %task.id, column = %task.column_id, "task created");
        Ok(task)
    }

    pub fn move_task(&mut self, task_id: &str, column_id: &str, now: DateTime<Utc>) -> Result<TaskCard> {
        self.mutate(|board| board.move_task(task_id, column_id, now))
    }

    pub fn reorder_column(
        &mut self,
        column_id: &str,
        ordered_ids: &[String],
        now: DateTime<Utc>,
    ) -> Result<Vec<TaskCard>> {
        self.mutate(|board| board.reorder_column(column_id, ordered_ids, now))
    }

    pub fn delete_task(&mut self, task_id: &str) -> Result<bool> {
        self.mutate(|board| Ok(board.delete_task(task_id)))
    }
}
