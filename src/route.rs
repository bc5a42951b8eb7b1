//! Route parsing.
//!
//! A route addresses a handler method: `[<serverType>.]<service>.<method>`.
//! An empty server type means "the local node's type" and is filled in by
//! the dispatcher before routing.

use std::fmt;

use crate::error::{MeshwireError, Result};

/// A parsed handler address.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Route {
    /// Target server type; empty for the local node.
    pub server_type: String,
    /// Service name.
    pub service: String,
    /// Method name.
    pub method: String,
}

impl Route {
    /// Parse a route string.
    ///
    /// Two components yield an empty server type; three fill all fields.
    /// Anything else, including empty components, is `BadRoute`.
    pub fn parse(s: &str) -> Result<Route> {
        let parts: Vec<&str> = s.split('.').collect();

        let route = match parts.as_slice() {
            [service, method] => Route {
                server_type: String::new(),
                service: (*service).to_string(),
                method: (*method).to_string(),
            },
            [server_type, service, method] => Route {
                server_type: (*server_type).to_string(),
                service: (*service).to_string(),
                method: (*method).to_string(),
            },
            _ => return Err(MeshwireError::BadRoute(s.to_string())),
        };

        if route.service.is_empty()
            || route.method.is_empty()
            || (parts.len() == 3 && route.server_type.is_empty())
        {
            return Err(MeshwireError::BadRoute(s.to_string()));
        }

        Ok(route)
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.server_type.is_empty() {
            write!(f, "{}.{}", self.service, self.method)
        } else {
            write!(f, "{}.{}.{}", self.server_type, self.service, self.method)
        }
    }
}
