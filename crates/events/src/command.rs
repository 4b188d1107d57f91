use ironbooks_core::TenantId;

/// Intent addressed to one aggregate. Commands are never persisted; the events
/// they produce are.
///
/// The tenant carried by a command must match the tenant of the stream it is
/// dispatched to.
pub trait Command: Clone + core::fmt::Debug + Send + Sync + 'static {
    fn tenant_id(&self) -> TenantId;
}

/// Implement [`Command`] for a command enum whose variants all wrap a struct
/// with a `tenant_id` field.
#[macro_export]
macro_rules! tenant_command {
    ($command:ty { $($variant:ident),+ $(,)? }) => {
        impl $crate::Command for $command {
            fn tenant_id(&self) -> ::ironbooks_core::TenantId {
                match self {
                    $(Self::$variant(c) => c.tenant_id,)+
                }
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone)]
    struct Open {
        tenant_id: TenantId,
    }

    #[derive(Debug, Clone)]
    struct Close {
        tenant_id: TenantId,
    }

    #[derive(Debug, Clone)]
    enum DoorCommand {
        Open(Open),
        Close(Close),
    }

    tenant_command!(DoorCommand { Open, Close });

    #[test]
    fn macro_reads_tenant_from_each_variant() {
        let t = TenantId::new();
        assert_eq!(DoorCommand::Open(Open { tenant_id: t }).tenant_id(), t);
        assert_eq!(DoorCommand::Close(Close { tenant_id: t }).tenant_id(), t);
    }
}
