//! Task board adapters.

use std::path::PathBuf;

use crate::domain::ports::TaskBoard;

/// Tasks live as files; finished ones are moved into `<tasks_dir>/done/`.
#[derive(Debug, Clone)]
pub struct DirectoryTaskBoard {
    tasks_dir: PathBuf,
}

impl DirectoryTaskBoard {
    pub fn new(tasks_dir: impl Into<PathBuf>) -> Self {
        Self {
            tasks_dir: tasks_dir.into(),
        }
    }
}

impl TaskBoard for DirectoryTaskBoard {
    fn is_done(&self, task_id: &str) -> bool {
        let done = self.tasks_dir.join("done");
        done.join(format!("{task_id}.md")).exists() || done.join(task_id).exists()
    }
}

/// No task board; nothing is ever relocated.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullTaskBoard;

impl TaskBoard for NullTaskBoard {
    fn is_done(&self, _: &str) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_directory_board() {
        let dir = tempfile::tempdir().unwrap();
        let board = DirectoryTaskBoard::new(dir.path());
        assert!(!board.is_done("t-1"));

        std::fs::create_dir_all(dir.path().join("done")).unwrap();
        std::fs::write(dir.path().join("done/t-1.md"), "# done").unwrap();
        assert!(board.is_done("t-1"));
        assert!(!NullTaskBoard.is_done("t-1"));
    }
}
