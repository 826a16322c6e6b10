// Copyright (c) 2025 SOLARE S.R.O.
//
// This file is part of FluxION.
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// (CC BY-NC-ND 4.0). You may use and share this file for non-commercial purposes only and you may not
// create derivatives. See <https://creativecommons.org/licenses/by-nc-nd/4.0/>.
//
// This software is provided "AS IS", without warranty of any kind.
//
// For commercial licensing, please contact: info@solare.cz

//! Proxy settings shared by the fetch worker and the launched payload

use std::fmt;

pub const DEFAULT_PROXY_PORT: u16 = 8080;

/// SOCKS proxy the bootstrap and the payload connect through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyConfig {
    pub host: String,
    pub port: u16,
    pub credentials: Option<ProxyCredentials>,
}

#[derive(Clone, PartialEq, Eq)]
pub struct ProxyCredentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for ProxyCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyCredentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl ProxyConfig {
    /// Builds the proxy from command line values. No host means a direct connection;
    /// credentials are only used when both user and password are given.
    #[must_use]
    pub fn from_parts(
        host: Option<String>,
        port: u16,
        username: Option<String>,
        password: Option<String>,
    ) -> Option<Self> {
        let host = non_empty(host)?;
        let credentials = match (non_empty(username), non_empty(password)) {
            (Some(username), Some(password)) => Some(ProxyCredentials { username, password }),
            _ => None,
        };
        Some(Self {
            host,
            port,
            credentials,
        })
    }

    #[must_use]
    pub fn url(&self) -> String {
        format!("socks5h://{}:{}", self.host, self.port)
    }

    pub fn to_reqwest(&self) -> reqwest::Result<reqwest::Proxy> {
        let proxy = reqwest::Proxy::all(self.url())?;
        Ok(match &self.credentials {
            Some(creds) => proxy.basic_auth(&creds.username, &creds.password),
            None => proxy,
        })
    }
}
