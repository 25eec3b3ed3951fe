//! Casbin model for role-based menu and path permissions

use casbin::DefaultModel;

/// Requests are `(username, object, kind)` where kind is `menu` or `path`.
/// Path objects match with `keyMatch2`, so `/api/v1/sites/:id` and
/// `/api/v1/sites/*` patterns work as stored. Menu ids compare literally.
pub const MODEL: &str = r#"
[request_definition]
r = sub, obj, act

[policy_definition]
p = sub, obj, act

[role_definition]
g = _, _

[policy_effect]
e = some(where (p.eft == allow))

[matchers]
m = g(r.sub, p.sub) && r.act == p.act && ((r.act == "menu" && r.obj == p.obj) || (r.act == "path" && keyMatch2(r.obj, p.obj)))
"#;

pub async fn casbin_model() -> casbin::Result<DefaultModel> {
    DefaultModel::from_str(MODEL).await
}
