use super::Synchronizer;
use crate::error::{SyncError, SyncResult};
use crate::model::{ChildEntity, Inspection, TestReport};
use crate::remote::Filter;

impl Synchronizer {
    /// Children of one valve; remote rows are merged only with that valve's local children
    async fn get_children<E: ChildEntity>(&self, valve_id: &str) -> SyncResult<Vec<E>> {
        let local: Vec<E> = self
            .load_local::<E>()
            .await?
            .into_iter()
            .filter(|child| child.valve_id() == Some(valve_id))
            .collect();

        Ok(self
            .read_through(local, &[Filter::equals("valve_id", valve_id)])
            .await)
    }

    async fn save_child<E: ChildEntity>(&self, child: E) -> SyncResult<E> {
        if child.valve_id().map_or(true, str::is_empty) {
            return Err(SyncError::InvalidOperation(format!(
                "{} must belong to a valve",
                E::KIND
            )));
        }
        self.save_entity(child).await
    }

    pub async fn get_inspections(&self, valve_id: &str) -> SyncResult<Vec<Inspection>> {
        self.get_children(valve_id).await
    }

    pub async fn save_inspection(&self, inspection: Inspection) -> SyncResult<Inspection> {
        self.save_child(inspection).await
    }

    pub async fn delete_inspection(&self, id: &str) -> SyncResult<()> {
        self.remove_entity::<Inspection>(id).await
    }

    pub async fn get_test_reports(&self, valve_id: &str) -> SyncResult<Vec<TestReport>> {
        self.get_children(valve_id).await
    }

    pub async fn save_test_report(&self, report: TestReport) -> SyncResult<TestReport> {
        self.save_child(report).await
    }

    pub async fn delete_test_report(&self, id: &str) -> SyncResult<()> {
        self.remove_entity::<TestReport>(id).await
    }
}
