use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::debug;

use super::{Mission, MissionState, Plan};
use crate::error::{Result, WayfarerError};

/// Durable unit: a mission and its plan are persisted together so a restart
/// resumes from a consistent pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MissionSnapshot {
    pub mission: Mission,
    pub plan: Option<Plan>,
}

pub struct MissionStore {
    missions_dir: PathBuf,
}

impl MissionStore {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            missions_dir: data_dir.join("missions"),
        }
    }

    pub async fn init(&self) -> Result<()> {
        fs::create_dir_all(self.missions_dir.join("archive")).await?;
        self.recover_interrupted_writes().await;
        Ok(())
    }

    pub async fn save(&self, snapshot: &MissionSnapshot) -> Result<()> {
        let path = self.mission_path(&snapshot.mission.id);
        let content = serde_yaml_bw::to_string(snapshot)?;
        self.write_atomic(&path, &content).await
    }

    async fn write_atomic(&self, path: &Path, content: &str) -> Result<()> {
        let tmp_path = path.with_extension("yaml.tmp");
        fs::write(&tmp_path, content).await?;

        let tmp_path_clone = tmp_path.clone();
        let sync_result = tokio::task::spawn_blocking(move || {
            std::fs::File::open(&tmp_path_clone).and_then(|file| file.sync_all())
        })
        .await;
        if let Ok(Err(e)) = sync_result {
            tracing::warn!(error = %e, "Failed to sync temp file to disk");
        }

        fs::rename(&tmp_path, path).await?;
        debug!(path = %path.display(), "Atomic write completed");
        Ok(())
    }

    // a *.tmp left behind is an interrupted write; the target file is intact
    async fn recover_interrupted_writes(&self) {
        if let Ok(mut entries) = fs::read_dir(&self.missions_dir).await {
            while let Ok(Some(entry)) = entries.next_entry().await {
                let path = entry.path();
                if path.extension().is_some_and(|ext| ext == "tmp") {
                    debug!(path = %path.display(), "Removing interrupted write");
                    let _ = fs::remove_file(&path).await;
                }
            }
        }
    }

    pub async fn load(&self, mission_id: &str) -> Result<MissionSnapshot> {
        let path = self.mission_path(mission_id);
        if !path.exists() {
            return Err(WayfarerError::MissionNotFound(mission_id.to_string()));
        }
        let content = fs::read_to_string(&path).await?;
        Ok(serde_yaml_bw::from_str(&content)?)
    }

    pub async fn list(&self) -> Result<Vec<MissionSnapshot>> {
        let mut snapshots = Vec::new();
        if !self.missions_dir.exists() {
            return Ok(snapshots);
        }

        let mut entries = fs::read_dir(&self.missions_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "yaml")
                && let Ok(content) = fs::read_to_string(&path).await
                && let Ok(snapshot) = serde_yaml_bw::from_str::<MissionSnapshot>(&content)
            {
                snapshots.push(snapshot);
            }
        }

        snapshots.sort_by(|a, b| b.mission.created_at.cmp(&a.mission.created_at));
        Ok(snapshots)
    }

    pub async fn list_active(&self) -> Result<Vec<MissionSnapshot>> {
        Ok(self
            .list()
            .await?
            .into_iter()
            .filter(|s| !s.mission.status.is_terminal())
            .collect())
    }

    pub async fn exists(&self, mission_id: &str) -> bool {
        self.mission_path(mission_id).exists()
    }

    /// Tasks are destroyed only by mission archival: the snapshot moves to
    /// the archive directory instead of being deleted.
    pub async fn archive(&self, mission_id: &str) -> Result<()> {
        let path = self.mission_path(mission_id);
        if !path.exists() {
            return Err(WayfarerError::MissionNotFound(mission_id.to_string()));
        }
        let target = self
            .missions_dir
            .join("archive")
            .join(format!("{}.yaml", mission_id));
        fs::rename(&path, &target).await?;
        debug!(mission_id, "Mission archived");
        Ok(())
    }

    pub async fn next_id(&self) -> Result<String> {
        let snapshots = self.list().await?;
        let max_num = snapshots
            .iter()
            .filter_map(|s| {
                s.mission
                    .id
                    .strip_prefix("m-")
                    .and_then(|n| n.parse::<u32>().ok())
            })
            .max()
            .unwrap_or(0);
        Ok(format!("m-{:03}", max_num + 1))
    }

    pub async fn list_by_status(&self, status: MissionState) -> Result<Vec<MissionSnapshot>> {
        Ok(self
            .list()
            .await?
            .into_iter()
            .filter(|s| s.mission.status == status)
            .collect())
    }

    fn mission_path(&self, mission_id: &str) -> PathBuf {
        self.missions_dir.join(format!("{}.yaml", mission_id))
    }
}
