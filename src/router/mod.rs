// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Route table and request matching.
//!
//! A [`Router`] owns a validated set of [`RouteRule`]s, partitioned at
//! construction into an exact-match index for static paths and an ordered
//! list of dynamic (parameterized) rules.  The **first** matching dynamic
//! rule wins, in registration order – there is deliberately no
//! longest-match or specificity ranking, so overlapping patterns behave
//! predictably.
//!
//! The table is built once and immutable afterwards; lookups take `&self`
//! and are safe from any number of concurrent request tasks.  Hot
//! reloading, if a deployment needs it, is an atomic swap of a whole new
//! `Arc<Router>`, never in-place mutation.

mod expressions;


pub use expressions::{regex_to_route, route_to_regex};

use std::collections::{HashMap, HashSet};

use regex::Regex;

use crate::core::{HttpMethod, ProxyError};

/// A single routing rule.
///
/// Paths with route parameters must be declared with curly brackets and
/// `dynamic = true`:
///
/// E.g.: `/api/transfers/{guid}`
///
/// Query parameters are ignored during matching, so a path that only ever
/// varies in its query component is a static rule.
#[derive(Debug, Clone)]
pub struct RouteRule {
    pub method: HttpMethod,
    pub path: String,
    pub dynamic: bool,
    regex: Option<Regex>,
}

impl RouteRule {
    /// Create a rule for the given method and path pattern.
    pub fn new(method: HttpMethod, path: impl Into<String>, dynamic: bool) -> Self {
        Self {
            method,
            path: path.into(),
            dynamic,
            regex: None,
        }
    }
}

/// A successful lookup: the matched rule plus any extracted parameters.
///
/// `params` is populated from the pattern's named capture groups; static
/// matches carry an empty map.  Values are raw path segments, not decoded
/// beyond what the transport already did.
#[derive(Debug)]
pub struct RouteMatch<'a> {
    pub rule: &'a RouteRule,
    pub params: HashMap<String, String>,
}

/// Immutable route table answering "does this request match, and with
/// what parameters".
#[derive(Debug)]
pub struct Router {
    rules: Vec<RouteRule>,
    /// Query-stripped path -> method -> index into `rules`.
    static_paths: HashMap<String, HashMap<HttpMethod, usize>>,
    /// Indices of dynamic rules, preserving registration order.
    dynamic_rules: Vec<usize>,
}

impl Router {
    /// Build a router from the given rules.
    ///
    /// Dynamic patterns are converted and compiled here; a pattern that
    /// fails to convert or compile aborts construction with an error
    /// naming the offending path, as does a duplicate `(method, path)`
    /// pair.  The same path registered under different methods coexists.
    pub fn new(rules: Vec<RouteRule>) -> Result<Self, ProxyError> {
        let mut router = Self {
            static_paths: HashMap::with_capacity(rules.len()),
            dynamic_rules: Vec::with_capacity(rules.len()),
            rules,
        };

        let mut seen: HashSet<(HttpMethod, String)> = HashSet::with_capacity(router.rules.len());

        for idx in 0..router.rules.len() {
            let rule = &router.rules[idx];

            if !seen.insert((rule.method, rule.path.clone())) {
                return Err(ProxyError::RoutingError(format!(
                    "path '{}' is registered multiple times for method '{}'",
                    rule.path, rule.method
                )));
            }

            if rule.dynamic {
                let pattern = route_to_regex(&rule.path)?;
                let compiled = Regex::new(&pattern).map_err(|e| {
                    ProxyError::RoutingError(format!(
                        "cannot compile dynamic path '{}': {}",
                        rule.path, e
                    ))
                })?;
                router.rules[idx].regex = Some(compiled);
                router.dynamic_rules.push(idx);
            } else {
                router
                    .static_paths
                    .entry(rule.path.clone())
                    .or_default()
                    .insert(rule.method, idx);
            }
        }

        Ok(router)
    }

    /// Find the rule matching the given method and request-URI.
    ///
    /// The query component (everything from the first `?`) is stripped
    /// before matching.  The static index is consulted first; dynamic
    /// rules are then scanned in registration order and the first match
    /// returns with its extracted parameters.
    ///
    /// Absence of a route is a normal outcome, not an error.
    pub fn find_match(&self, method: HttpMethod, request_uri: &str) -> Option<RouteMatch<'_>> {
        let path = strip_query(request_uri);

        if let Some(by_method) = self.static_paths.get(path) {
            if let Some(&idx) = by_method.get(&method) {
                return Some(RouteMatch {
                    rule: &self.rules[idx],
                    params: HashMap::new(),
                });
            }
        }

        for &idx in &self.dynamic_rules {
            let rule = &self.rules[idx];
            if rule.method != method {
                continue;
            }
            // Invariant: every dynamic rule compiled during construction.
            let Some(regex) = rule.regex.as_ref() else {
                continue;
            };
            if let Some(caps) = regex.captures(path) {
                let mut params = HashMap::new();
                for name in regex.capture_names().flatten() {
                    if let Some(value) = caps.name(name) {
                        params.insert(name.to_string(), value.as_str().to_string());
                    }
                }
                return Some(RouteMatch {
                    rule,
                    params,
                });
            }
        }

        None
    }

    /// Side-effect-free existence check using the same algorithm as
    /// [`Router::find_match`], without parameter extraction.
    pub fn has_match(&self, method: HttpMethod, request_uri: &str) -> bool {
        let path = strip_query(request_uri);

        if let Some(by_method) = self.static_paths.get(path) {
            if by_method.contains_key(&method) {
                return true;
            }
        }

        self.dynamic_rules.iter().any(|&idx| {
            let rule = &self.rules[idx];
            rule.method == method
                && rule
                    .regex
                    .as_ref()
                    .is_some_and(|regex| regex.is_match(path))
        })
    }

    /// All registered rules, in registration order.
    pub fn rules(&self) -> &[RouteRule] {
        &self.rules
    }
}

fn strip_query(request_uri: &str) -> &str {
    request_uri.split('?').next().unwrap_or(request_uri)
}
