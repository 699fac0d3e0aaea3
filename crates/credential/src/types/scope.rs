//! Token capability grants

string_enum! {
    /// Capability granted to an issued token
    pub enum Scope rejects UnknownTokenScope {
        Api => "api",
        ReadApi => "read_api",
        ReadUser => "read_user",
        ReadRepository => "read_repository",
        WriteRepository => "write_repository",
        ReadRegistry => "read_registry",
        WriteRegistry => "write_registry",
        Sudo => "sudo",
        AdminMode => "admin_mode",
        CreateRunner => "create_runner",
        ManageRunner => "manage_runner",
        AiFeatures => "ai_features",
        K8sProxy => "k8s_proxy",
        ReadServicePing => "read_service_ping",
        SelfRotate => "self_rotate",
        ReadVirtualRegistry => "read_virtual_registry",
        WriteVirtualRegistry => "write_virtual_registry",
        ReadObservability => "read_observability",
        WriteObservability => "write_observability",
        ReadPackageRegistry => "read_package_registry",
        WritePackageRegistry => "write_package_registry",
    }
}

/// Render scopes as the provider's comma separated list
#[must_use]
pub fn join(scopes: &[Scope]) -> String {
    scopes
        .iter()
        .map(|s| s.as_str())
        .collect::<Vec<_>>()
        .join(",")
}
