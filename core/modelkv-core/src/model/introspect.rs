//! Model Introspector: pure structural questions over a model.

use super::{Model, ModelRegistry, Property, PropertyType, RESERVED_PREFIX};
use ahash::AHashSet;

/// Names listed in the model's `required` array.
pub fn required_properties(model: &Model) -> AHashSet<&str> {
    model.required.iter().map(String::as_str).collect()
}

pub fn is_required(model: &Model, property_name: &str) -> bool {
    model.required.iter().any(|name| name == property_name)
}

/// Interfaces, abstract models and the base model never get a table.
pub fn is_instantiable(model: &Model, base_model_id: &str) -> bool {
    !(model.id == base_model_id || model.is_interface || model.is_abstract)
}

/// `ref` for objects, `items.ref` for arrays.
pub fn ref_of(property: &Property) -> Option<&str> {
    property
        .reference
        .as_deref()
        .or_else(|| property.items.as_ref().and_then(|i| i.reference.as_deref()))
}

/// Whether values of this property are embedded rather than stubbed.
///
/// A reference to a model missing from the registry is not inlined.
pub fn is_inlined(property: &Property, models: &ModelRegistry) -> bool {
    if property.inlined || property.range.as_deref() == Some("json") {
        return true;
    }

    if let Some(reference) = property.reference.as_deref() {
        return models.try_get(reference).is_some_and(|m| m.inlined);
    }

    property.kind == PropertyType::Array
        && property.items.as_ref().is_none_or(|i| i.reference.is_none())
}

/// Declared property names minus reserved (`_`-prefixed) ones, in name order.
pub fn own_properties(model: &Model) -> Vec<&str> {
    model
        .properties
        .keys()
        .map(String::as_str)
        .filter(|name| !name.starts_with(RESERVED_PREFIX))
        .collect()
}

pub fn is_email_property(property_name: &str, property: &Property) -> bool {
    property.kind == PropertyType::String
        && (property.keyboard.as_deref() == Some("email-address")
            || property_name.to_ascii_lowercase().contains("email"))
}

/// Backlinks are computed, never written by the creator.
pub fn is_set_on_create(property: &Property) -> bool {
    !property.backlink
}

pub fn on_create_properties(model: &Model) -> Vec<&str> {
    model
        .properties
        .iter()
        .filter(|(_, property)| is_set_on_create(property))
        .map(|(name, _)| name.as_str())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> ModelRegistry {
        ModelRegistry::new(vec![
            Model::new("tradle.Money").inlined(),
            Model::new("tradle.Photo").property("url", Property::string()),
        ])
        .unwrap()
    }

    #[test]
    fn test_required_properties() {
        let model = Model::new("a.B")
            .property("name", Property::string())
            .property("age", Property::number())
            .required("name");
        let required = required_properties(&model);
        assert!(required.contains("name"));
        assert!(!required.contains("age"));
        assert!(is_required(&model, "name"));
    }

    #[test]
    fn test_is_instantiable() {
        assert!(!is_instantiable(&Model::new("tradle.Model"), "tradle.Model"));
        assert!(!is_instantiable(&Model::new("a.I").interface(), "tradle.Model"));
        assert!(!is_instantiable(&Model::new("a.A").abstract_model(), "tradle.Model"));
        assert!(is_instantiable(&Model::new("a.Widget"), "tradle.Model"));
    }

    #[test]
    fn test_is_inlined() {
        let models = registry();
        assert!(is_inlined(&Property::reference("x.Y").inlined(), &models));
        assert!(is_inlined(&Property::string().with_range("json"), &models));
        assert!(is_inlined(&Property::reference("tradle.Money"), &models));
        assert!(!is_inlined(&Property::reference("tradle.Photo"), &models));
        assert!(!is_inlined(&Property::reference("not.Loaded"), &models));
        assert!(is_inlined(&Property::inline_array(), &models));
        assert!(!is_inlined(&Property::array_of("tradle.Photo"), &models));
        assert!(!is_inlined(&Property::string(), &models));
    }

    #[test]
    fn test_ref_of() {
        assert_eq!(ref_of(&Property::reference("a.B")), Some("a.B"));
        assert_eq!(ref_of(&Property::array_of("a.C")), Some("a.C"));
        assert_eq!(ref_of(&Property::string()), None);
    }

    #[test]
    fn test_own_properties_skip_reserved() {
        let model = Model::new("a.B")
            .property("_t", Property::string())
            .property("name", Property::string())
            .property("color", Property::string());
        assert_eq!(own_properties(&model), vec!["color", "name"]);
    }

    #[test]
    fn test_email_and_on_create() {
        assert!(is_email_property("contactEmail", &Property::string()));
        assert!(is_email_property(
            "contact",
            &Property::string().with_keyboard("email-address")
        ));
        assert!(!is_email_property("emailCount", &Property::number()));

        let model = Model::new("a.B")
            .property("name", Property::string())
            .property("children", Property::array_of("a.C").backlink());
        assert_eq!(on_create_properties(&model), vec!["name"]);
    }
}
