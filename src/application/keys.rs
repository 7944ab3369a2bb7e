//! Well-known binding keys and tags of an application.

/// The application's root context.
pub const APPLICATION_INSTANCE: &str = "application.instance";
/// The loaded configuration, as JSON.
pub const APPLICATION_CONFIG: &str = "application.config";

/// Namespace of controller bindings: `controllers.<name>`.
pub const CONTROLLERS: &str = "controllers";
pub const CONTROLLER_TAG: &str = "controller";

/// Namespace of server bindings: `servers.<name>`.
pub const SERVERS: &str = "servers";
pub const SERVER_TAG: &str = "server";

/// Namespace of component bindings: `components.<name>`.
pub const COMPONENTS: &str = "components";
pub const COMPONENT_TAG: &str = "component";

/// Key of an extension's configuration: `<point>.<extension>.config`.
///
/// The reserved extension name `config` addresses the point itself:
/// `<point>.config`.
pub fn extension_config(extension_point: &str, extension: &str) -> String {
    if extension == "config" {
        return format!("{extension_point}.config");
    }
    format!("{extension_point}.{extension}.config")
}

pub(crate) fn namespaced(namespace: &str, name: &str) -> String {
    format!("{namespace}.{name}")
}
