use axum::{
    extract::Request,
    http::{header, StatusCode},
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::error::{ShopfloorError, ShopfloorResult};

/// Ordered role hierarchy. Route gates compare against a minimum role with a
/// single `>=` instead of per-handler numeric checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Role {
    Operator,
    Supervisor,
    Admin,
}

impl Role {
    pub fn parse(s: &str) -> Option<Role> {
        match s {
            "ADMIN" => Some(Role::Admin),
            "SUPERVISOR" => Some(Role::Supervisor),
            "OPERATOR" => Some(Role::Operator),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "ADMIN",
            Role::Supervisor => "SUPERVISOR",
            Role::Operator => "OPERATOR",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String,
    pub user_id: i32,
    pub name: String,
    pub role: String,
    pub exp: usize,
}

impl Claims {
    pub fn role(&self) -> Role {
        // Unknown role strings get the lowest privilege.
        Role::parse(&self.role).unwrap_or(Role::Operator)
    }

    pub fn require(&self, minimum: Role) -> ShopfloorResult<()> {
        if self.role() >= minimum {
            Ok(())
        } else {
            Err(ShopfloorError::Forbidden(format!(
                "{} role required",
                minimum.as_str()
            )))
        }
    }
}

pub fn get_jwt_secret() -> Vec<u8> {
    std::env::var("JWT_SECRET")
        .unwrap_or_else(|_| {
            tracing::warn!("JWT_SECRET not set, using insecure default!");
            "insecure-development-secret-key-replace-me-immediately".to_string()
        })
        .into_bytes()
}

const TOKEN_TTL_SECS: i64 = 12 * 3600;

pub fn issue_token(user_id: i32, email: &str, name: &str, role: &str) -> ShopfloorResult<String> {
    let exp = (chrono::Utc::now().timestamp() + TOKEN_TTL_SECS) as usize;
    let claims = Claims {
        sub: email.to_string(),
        user_id,
        name: name.to_string(),
        role: role.to_string(),
        exp,
    };
    Ok(encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(&get_jwt_secret()),
    )?)
}

fn decode_token(token: &str) -> Option<Claims> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(&get_jwt_secret()),
        &Validation::default(),
    )
    .ok()
    .map(|data| data.claims)
}

/// The session token is carried either in the `token` cookie (browser
/// clients) or a bearer Authorization header (API clients).
fn extract_token(request: &Request) -> Option<String> {
    if let Some(cookie_header) = request.headers().get(header::COOKIE) {
        if let Ok(cookies) = cookie_header.to_str() {
            for pair in cookies.split(';') {
                if let Some(value) = pair.trim().strip_prefix("token=") {
                    return Some(value.to_string());
                }
            }
        }
    }

    let auth_header = request.headers().get(header::AUTHORIZATION)?;
    let auth_str = auth_header.to_str().ok()?;
    auth_str.strip_prefix("Bearer ").map(|t| t.to_string())
}

pub async fn auth_middleware(mut request: Request, next: Next) -> Result<Response, StatusCode> {
    let path = request.uri().path();
    let public_routes = ["/api/auth/login", "/api/ping"];

    if !path.starts_with("/api/") || public_routes.contains(&path) {
        return Ok(next.run(request).await);
    }

    let token = extract_token(&request).ok_or(StatusCode::UNAUTHORIZED)?;
    let claims = decode_token(&token).ok_or(StatusCode::UNAUTHORIZED)?;

    request.extensions_mut().insert(claims);

    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_hierarchy_ordering() {
        assert!(Role::Admin > Role::Supervisor);
        assert!(Role::Supervisor > Role::Operator);
        assert!(Role::Admin > Role::Operator);
    }

    #[test]
    fn role_parse_round_trip() {
        for role in [Role::Admin, Role::Supervisor, Role::Operator] {
            assert_eq!(Role::parse(role.as_str()), Some(role));
        }
        assert_eq!(Role::parse("ROOT"), None);
    }

    #[test]
    fn claims_require_minimum_role() {
        let claims = Claims {
            sub: "sup@example.com".to_string(),
            user_id: 2,
            name: "Sup".to_string(),
            role: "SUPERVISOR".to_string(),
            exp: 0,
        };
        assert!(claims.require(Role::Operator).is_ok());
        assert!(claims.require(Role::Supervisor).is_ok());
        assert!(claims.require(Role::Admin).is_err());
    }

    #[test]
    fn unknown_role_gets_lowest_privilege() {
        let claims = Claims {
            sub: "x@example.com".to_string(),
            user_id: 9,
            name: "X".to_string(),
            role: "WIZARD".to_string(),
            exp: 0,
        };
        assert_eq!(claims.role(), Role::Operator);
        assert!(claims.require(Role::Supervisor).is_err());
    }

    #[test]
    fn token_round_trip() {
        let token = issue_token(1, "admin@example.com", "Admin", "ADMIN").unwrap();
        let claims = decode_token(&token).expect("token should decode");
        assert_eq!(claims.user_id, 1);
        assert_eq!(claims.sub, "admin@example.com");
        assert_eq!(claims.role(), Role::Admin);
    }
}
