use ironbooks_core::TenantId;

use crate::EventEnvelope;

/// Messages that belong to exactly one tenant. Used to filter shared streams
/// (e.g. the realtime feed) down to the caller's tenant.
pub trait TenantScoped {
    fn tenant_id(&self) -> TenantId;
}

impl<E> TenantScoped for EventEnvelope<E> {
    fn tenant_id(&self) -> TenantId {
        self.tenant_id()
    }
}
