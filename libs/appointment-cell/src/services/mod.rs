pub mod booking;
pub mod clock;
pub mod conflict;
pub mod directory;
pub mod lifecycle;
pub mod store;
pub mod supabase_store;

pub use booking::AppointmentBookingService;
pub use clock::{Clock, FixedClock, SystemClock};
pub use conflict::ConflictDetectionService;
pub use directory::{IdentityDirectory, InMemoryDirectory};
pub use lifecycle::AppointmentLifecycleService;
pub use store::{AppointmentStore, InMemoryAppointmentStore, StatusUpdate, StoreError};
pub use supabase_store::{SupabaseAppointmentStore, SupabaseDirectory};

use std::future::Future;
use std::time::Duration;

/// Bound a collaborator call. An elapsed timeout becomes
/// [`StoreError::Unavailable`], never a scheduling answer.
pub(crate) async fn with_timeout<T, F>(timeout: Duration, call: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    tokio::time::timeout(timeout, call)
        .await
        .unwrap_or_else(|_| Err(StoreError::Unavailable(format!("call timed out after {:?}", timeout))))
}
