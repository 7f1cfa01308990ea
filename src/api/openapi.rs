use crate::api::handlers::{accounts, health};
use utoipa::openapi::{Contact, InfoBuilder, License, OpenApiBuilder, Tag};
use utoipa_axum::{router::OpenApiRouter, routes};

#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    // Reuse the same router wiring and only return the generated OpenAPI spec.
    let (_router, openapi) = api_router().split_for_parts();
    openapi
}

/// Build the router that also drives the `OpenAPI` document.
///
/// Add new endpoints here via `.routes(routes!(...))` so they are both
/// served and included in the generated `OpenAPI` spec. Routes added
/// outside (like `/`) are intentionally not documented.
pub(crate) fn api_router() -> OpenApiRouter {
    let mut accounts_tag = Tag::new("accounts");
    accounts_tag.description =
        Some("Signup, activation, email confirmation, password".to_string());
    let mut profiles_tag = Tag::new("profiles");
    profiles_tag.description = Some("Profile visibility and editing".to_string());
    let mut auth_tag = Tag::new("auth");
    auth_tag.description = Some("Sessions and sign-in".to_string());

    let mut openapi = cargo_openapi();
    openapi.tags = Some(vec![accounts_tag, profiles_tag, auth_tag]);

    // `routes!` reads #[utoipa::path] to bind HTTP method + path and add the route to OpenAPI.
    OpenApiRouter::with_openapi(openapi)
        .routes(routes!(health::health))
        .routes(routes!(accounts::signup::signup))
        .routes(routes!(accounts::activation::activate))
        .routes(routes!(accounts::activation::activate_retry))
        .routes(routes!(accounts::email_change::request_email_change))
        .routes(routes!(accounts::email_change::confirm_email_change))
        .routes(routes!(accounts::password::change_password))
        .routes(routes!(
            accounts::profile::get_profile,
            accounts::profile::edit_profile
        ))
        .routes(routes!(accounts::profile::profile_list))
        .routes(routes!(accounts::session::signin))
        .routes(routes!(accounts::session::signout))
        .routes(routes!(accounts::session::session))
}

fn cargo_openapi() -> utoipa::openapi::OpenApi {
    // Use Cargo.toml metadata instead of the utoipa-axum crate info defaults.
    let mut info = InfoBuilder::new()
        .title(env!("CARGO_PKG_NAME"))
        .version(env!("CARGO_PKG_VERSION"))
        .description(optional_str(env!("CARGO_PKG_DESCRIPTION")))
        .build();

    info.contact = cargo_contact();
    info.license = cargo_license();

    OpenApiBuilder::new().info(info).build()
}

fn cargo_contact() -> Option<Contact> {
    // Cargo authors are `;` separated and may include "Name <email>".
    let authors = env!("CARGO_PKG_AUTHORS");
    let primary = authors.split(';').next().map(str::trim)?;
    if primary.is_empty() {
        return None;
    }

    let (name, email) = parse_author(primary);
    if name.is_none() && email.is_none() {
        return None;
    }

    let mut contact = Contact::new();
    contact.name = name.map(str::to_string);
    contact.email = email.map(str::to_string);
    Some(contact)
}

fn cargo_license() -> Option<License> {
    let identifier = optional_str(env!("CARGO_PKG_LICENSE"))?;
    let mut license = License::new(identifier);
    license.identifier = Some(identifier.to_string());
    Some(license)
}

fn optional_str(value: &'static str) -> Option<&'static str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}

fn parse_author(author: &str) -> (Option<&str>, Option<&str>) {
    if let Some(start) = author.find('<') {
        let name = author[..start].trim();
        let email = author[start + 1..].trim_end_matches('>').trim();
        (
            if name.is_empty() { None } else { Some(name) },
            if email.is_empty() { None } else { Some(email) },
        )
    } else {
        let name = author.trim();
        (if name.is_empty() { None } else { Some(name) }, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openapi_document_lists_account_paths() {
        let doc = openapi();
        let paths = &doc.paths.paths;
        assert!(paths.contains_key("/health"));
        assert!(paths.contains_key("/v1/accounts"));
        assert!(paths.contains_key("/v1/accounts/activate"));
        assert!(paths.contains_key("/v1/accounts/activate/retry"));
        assert!(paths.contains_key("/v1/accounts/{username}/email"));
        assert!(paths.contains_key("/v1/accounts/confirm-email"));
        assert!(paths.contains_key("/v1/accounts/{username}/password"));
        assert!(paths.contains_key("/v1/profiles"));
        assert!(paths.contains_key("/v1/profiles/{username}"));
        assert!(paths.contains_key("/v1/auth/signin"));
        assert!(paths.contains_key("/v1/auth/signout"));
        assert!(paths.contains_key("/v1/auth/session"));
    }

    #[test]
    fn openapi_info_comes_from_cargo_metadata() {
        let doc = openapi();
        assert_eq!(doc.info.title, env!("CARGO_PKG_NAME"));
        assert_eq!(doc.info.version, env!("CARGO_PKG_VERSION"));
    }

    #[test]
    fn parse_author_splits_name_and_email() {
        assert_eq!(
            parse_author("Team Vestibule <team@vestibule.dev>"),
            (Some("Team Vestibule"), Some("team@vestibule.dev"))
        );
        assert_eq!(parse_author("Just A Name"), (Some("Just A Name"), None));
        assert_eq!(parse_author("<only@email>"), (None, Some("only@email")));
    }
}
