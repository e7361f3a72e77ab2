use super::Synchronizer;
use crate::error::SyncResult;
use crate::model::Job;

impl Synchronizer {
    /// All jobs, merged with the remote when it is available
    pub async fn get_jobs(&self) -> SyncResult<Vec<Job>> {
        let local = self.load_local::<Job>().await?;
        Ok(self.read_through(local, &[]).await)
    }

    pub async fn get_job(&self, id: &str) -> SyncResult<Option<Job>> {
        self.load_one(id).await
    }

    pub async fn save_job(&self, job: Job) -> SyncResult<Job> {
        self.save_entity(job).await
    }

    /// Remove a job; records referencing it keep their `job_id`
    pub async fn delete_job(&self, id: &str) -> SyncResult<()> {
        self.remove_entity::<Job>(id).await
    }
}
