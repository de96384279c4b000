use async_trait::async_trait;
use std::path::PathBuf;
use switchboard_core::{CollaborationTask, SwitchboardError, SwitchboardResult, TaskQuery, TaskStore};
use tracing::warn;
use uuid::Uuid;

/// One JSON file per task under a directory.
pub struct FileTaskStore {
    dir: PathBuf,
}

impl FileTaskStore {
    pub async fn new(dir: PathBuf) -> SwitchboardResult<Self> {
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self { dir })
    }

    fn task_path(&self, id: Uuid) -> PathBuf {
        self.dir.join(format!("{}.json", id))
    }

    async fn read(&self, id: Uuid) -> SwitchboardResult<Option<CollaborationTask>> {
        let path = self.task_path(id);
        if !path.exists() {
            return Ok(None);
        }
        let data = tokio::fs::read_to_string(path).await?;
        let task = serde_json::from_str(&data)
            .map_err(|e| SwitchboardError::Persistence(format!("Failed to parse task {id}: {e}")))?;
        Ok(Some(task))
    }
}

#[async_trait]
impl TaskStore for FileTaskStore {
    async fn insert(&self, task: &CollaborationTask) -> SwitchboardResult<()> {
        let path = self.task_path(task.id);
        let json = serde_json::to_string_pretty(task)?;
        // Write then rename so readers never see a half-written file.
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn update(&self, task: &CollaborationTask) -> SwitchboardResult<()> {
        self.insert(task).await
    }

    async fn query(&self, query: &TaskQuery) -> SwitchboardResult<Vec<CollaborationTask>> {
        if let Some(id) = query.id {
            return Ok(self.read(id).await?.into_iter().filter(|t| query.matches(t)).collect());
        }

        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        let mut out = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let Some(id) = entry
                .file_name()
                .to_str()
                .and_then(|name| name.strip_suffix(".json"))
                .and_then(|stem| Uuid::parse_str(stem).ok())
            else {
                continue;
            };
            match self.read(id).await {
                Ok(Some(task)) if query.matches(&task) => out.push(task),
                Ok(_) => {}
                Err(e) => warn!(task_id = %id, error = %e, "Skipping unreadable task file"),
            }
        }
        out.sort_by_key(|t| t.requested_at);
        Ok(out)
    }
}
