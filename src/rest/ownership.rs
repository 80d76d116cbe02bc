use crate::middleware::CallerContext;

/// Owner id for a scoped model, read from the authenticated caller only.
///
/// `None` when the model has no ownership property or the caller context does
/// not carry a usable value for it. The request body is never consulted.
pub fn extract_parent_id(caller: Option<&CallerContext>, property: Option<&str>) -> Option<String> {
    let property = property?;
    let value = caller?.get(property)?.trim();
    (!value.is_empty()).then(|| value.to_string())
}
