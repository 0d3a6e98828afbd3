//! Status-frame control verbs and the `Service.Method` naming convention.

/// Control verbs exchanged on the forward channel during client registration.
pub mod server_message {
    pub const ADD_CLIENT: &str = "ServerMessage.AddClient";
    pub const CLIENT_ADDED: &str = "ServerMessage.ClientAdded";
    /// Sent by the client once its reverse leg is dialed, carrying the
    /// `client_id` it was just assigned — the only way the server's
    /// accept-side transport learns the reverse connection's identity
    /// before it can address `ValidateClient` to it.
    pub const OPEN_REVERSE: &str = "ServerMessage.OpenReverse";
    pub const VALIDATE_CLIENT: &str = "ServerMessage.ValidateClient";
    pub const CLIENT_VALIDATED: &str = "ServerMessage.ClientValidated";
    pub const FORWARD_CALL: &str = "ServerMessage.ForwardCall";
}

/// Control verbs for endpoint-level introspection, handled by every
/// `RoutingLayer` regardless of the services it hosts.
pub mod routing_message {
    pub const GET_APP_INFO: &str = "RoutingMessage.GetAppInfo";
    pub const GET_SCHEMA: &str = "RoutingMessage.GetSchema";
    pub const SET_SCHEMA: &str = "RoutingMessage.SetSchema";
}

/// Builds the `Service.Method` status string for an outbound call.
pub fn method_status(service: &str, method: &str) -> String {
    format!("{service}.{method}")
}

/// Builds the `response:Service.Method` status string for a reply.
pub fn response_status(status: &str) -> String {
    format!("response:{status}")
}

/// Builds the `fwd_response:Service.Method` status string for a forwarded reply.
pub fn forward_response_status(method: &str) -> String {
    format!("fwd_response:{method}")
}

/// Builds the `message_dropped:<verb>` status string used when a reverse
/// reader ignores a message that isn't the validation handshake it's
/// waiting for.
pub fn dropped_status(verb: &str) -> String {
    format!("message_dropped:{verb}")
}

/// Splits a `Service.Method` status into its two parts.
///
/// Returns `None` for control verbs and response-wrapped statuses, which
/// are never routed through service dispatch.
pub fn split_service_method(status: &str) -> Option<(&str, &str)> {
    if status.starts_with("response:")
        || status.starts_with("fwd_response:")
        || status.starts_with("message_dropped:")
        || status.starts_with("ServerMessage.")
        || status.starts_with("RoutingMessage.")
    {
        return None;
    }
    status.split_once('.')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_status_roundtrips_through_response_wrapping() {
        let status = method_status("HelloService", "Hello");
        assert_eq!(status, "HelloService.Hello");
        assert_eq!(response_status(&status), "response:HelloService.Hello");
        assert_eq!(
            forward_response_status(&status),
            "fwd_response:HelloService.Hello"
        );
    }

    #[test]
    fn split_service_method_rejects_control_and_wrapped_statuses() {
        assert_eq!(
            split_service_method("HelloService.Hello"),
            Some(("HelloService", "Hello"))
        );
        assert_eq!(split_service_method(server_message::ADD_CLIENT), None);
        assert_eq!(split_service_method("response:HelloService.Hello"), None);
        assert_eq!(
            split_service_method("fwd_response:HelloService.Hello"),
            None
        );
        assert_eq!(split_service_method("message_dropped:foo"), None);
    }
}
