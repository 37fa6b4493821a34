// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Route-expression / regular-expression conversions.
//!
//! A route expression is the human-facing pattern syntax: `{identifier}`
//! marks a named path parameter, everything else is a literal.
//!
//! E.g.: `/api/transfers/{guid}` converts to
//! `/api/transfers/(?P<guid>\S+)` and back.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::core::ProxyError;

static ROUTE_PARAM: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{(\w+)\}").unwrap());

static REGEX_PARAM: Lazy<Regex> = Lazy::new(|| Regex::new(r"\(\?P<(\w+)>\\S\+\)").unwrap());

/// Convert a route expression to regular-expression format.
///
/// Each `{identifier}` becomes a named capture group matching one or more
/// non-whitespace characters.  Parameters are greedy; a static literal
/// between two parameters acts as the boundary that resolves them.
///
/// E.g.: `{guid}` converts to `(?P<guid>\S+)`.
pub fn route_to_regex(routeex: &str) -> Result<String, ProxyError> {
    validate_route_expression(routeex)?;
    Ok(ROUTE_PARAM.replace_all(routeex, r"(?P<$1>\S+)").into_owned())
}

/// Convert a regular expression back to route-expression format.
///
/// Inverse of [`route_to_regex`], used for round-trip validation.
///
/// E.g.: `(?P<guid>\S+)` converts to `{guid}`.
pub fn regex_to_route(regex: &str) -> Result<String, ProxyError> {
    let routeex = REGEX_PARAM.replace_all(regex, "{$1}").into_owned();
    validate_route_expression(&routeex)?;
    Ok(routeex)
}

/// Check that every brace pair in the expression forms a well-formed,
/// non-adjacent named parameter.
///
/// Two parameters with no literal between them (`{a}{b}`) are inherently
/// ambiguous under greedy non-whitespace matching and are rejected here
/// rather than silently mis-split at request time.
fn validate_route_expression(routeex: &str) -> Result<(), ProxyError> {
    let mut in_param = false;
    let mut ident_len = 0usize;
    let mut prev_was_param = false;

    for c in routeex.chars() {
        match c {
            '{' => {
                if in_param {
                    return Err(ProxyError::RoutingError(format!(
                        "unbalanced braces in route expression: '{routeex}'"
                    )));
                }
                if prev_was_param {
                    return Err(ProxyError::RoutingError(format!(
                        "adjacent parameters without a literal separator: '{routeex}'"
                    )));
                }
                in_param = true;
                ident_len = 0;
            }
            '}' => {
                if !in_param {
                    return Err(ProxyError::RoutingError(format!(
                        "unbalanced braces in route expression: '{routeex}'"
                    )));
                }
                if ident_len == 0 {
                    return Err(ProxyError::RoutingError(format!(
                        "empty parameter name in route expression: '{routeex}'"
                    )));
                }
                in_param = false;
                prev_was_param = true;
            }
            _ if in_param => {
                if c.is_alphanumeric() || c == '_' {
                    ident_len += 1;
                } else {
                    return Err(ProxyError::RoutingError(format!(
                        "invalid character '{c}' in parameter name: '{routeex}'"
                    )));
                }
            }
            _ => {
                prev_was_param = false;
            }
        }
    }

    if in_param {
        return Err(ProxyError::RoutingError(format!(
            "unbalanced braces in route expression: '{routeex}'"
        )));
    }

    Ok(())
}
