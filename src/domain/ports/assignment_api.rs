use crate::domain::entities::Assignment;
use crate::domain::errors::RealtimeResult;

/// REST assignment service; read-only from the messaging core's point of view
#[async_trait::async_trait]
pub trait AssignmentApi: Send + Sync {
    /// Active assignment the user takes part in, as customer or staff
    async fn current_assignment(&self, user_id: &str) -> RealtimeResult<Option<Assignment>>;

    /// All active assignments handled by a staff member
    async fn list_assignments_for_staff(&self, staff_id: &str) -> RealtimeResult<Vec<Assignment>>;
}
