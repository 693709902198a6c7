//! Well-known names of objects managed for a VirtualRouter

/// Service account the router pods run as
pub const SERVICE_ACCOUNT_NAME: &str = "virtualrouter-sa";
/// Role granting the router access to its rule resources
pub const ROLE_NAME: &str = "virtualrouter-role";
/// Binding of [`ROLE_NAME`] to [`SERVICE_ACCOUNT_NAME`]
pub const ROLE_BINDING_NAME: &str = "virtualrouter-rb";

/// Label key/value selecting router pods
pub const APP_LABEL_KEY: &str = "app";
pub const APP_LABEL_VALUE: &str = "virtualrouterInstance";

/// Finalizer placed on router pods, removed by the node daemon
pub const DAEMON_FINALIZER: &str = "virtualrouter/daemon-finalizer";

/// Traceability annotations pointing back at the owning VirtualRouter
pub const OWNER_NAME_ANNOTATION: &str = "customresourceName";
pub const OWNER_NAMESPACE_ANNOTATION: &str = "customresourceNamespace";

/// Environment variable exposing the private namespace to the router process
pub const POD_NAMESPACE_ENV: &str = "POD_NAMESPACE";

/// API group of the NAT/firewall/load-balancer rule resources
pub const RULES_API_GROUP: &str = "tmax.io";
/// Rule resources the router reconciles itself
pub const RULE_RESOURCES: [&str; 3] = ["natrules", "firewallrules", "loadbalancerrules"];

/// API group of the VPN resources the router reads
pub const NETWORK_API_GROUP: &str = "network.tmaxanc.com";
pub const VPN_RESOURCE: &str = "vpns";
