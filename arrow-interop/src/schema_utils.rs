use arrow_schema::{DataType, Field, Schema};

pub trait SchemaExt {
    fn has_dictionaries(&self) -> bool;
    fn dictionary_field_names(&self) -> Vec<&str>;
}

impl SchemaExt for Schema {
    fn has_dictionaries(&self) -> bool {
        self.fields().iter().any(|f| matches!(f.data_type(), DataType::Dictionary(_, _)))
    }

    fn dictionary_field_names(&self) -> Vec<&str> {
        self.fields()
            .iter()
            .filter(|f| matches!(f.data_type(), DataType::Dictionary(_, _)))
            .map(|f| f.name().as_str())
            .collect()
    }
}

/// Type of the values physically stored for `dt`: the index type for
/// dictionary-encoded data, `dt` itself otherwise.
pub fn physical_type(dt: &DataType) -> &DataType {
    match dt {
        DataType::Dictionary(index, _) => index.as_ref(),
        other => other,
    }
}

/// The plain index field standing in for a dictionary-encoded `field`.
pub fn index_field(field: &Field) -> Option<Field> {
    match field.data_type() {
        DataType::Dictionary(index, _) => Some(
            Field::new(field.name(), index.as_ref().clone(), field.is_nullable())
                .with_metadata(field.metadata().clone()),
        ),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> Schema {
        Schema::new(vec![
            Field::new("a", DataType::Int64, false),
            Field::new_dictionary("b", DataType::Int32, DataType::Utf8, true),
        ])
    }

    #[test]
    fn finds_dictionary_fields() {
        let schema = schema();
        assert!(schema.has_dictionaries());
        assert_eq!(schema.dictionary_field_names(), vec!["b"]);
    }

    #[test]
    fn index_field_keeps_name_and_nullability() {
        let schema = schema();
        let idx = index_field(schema.field(1)).unwrap();
        assert_eq!(idx.name(), "b");
        assert_eq!(idx.data_type(), &DataType::Int32);
        assert!(idx.is_nullable());
        assert!(index_field(schema.field(0)).is_none());
    }

    #[test]
    fn physical_type_unwraps_dictionary() {
        assert_eq!(physical_type(schema().field(1).data_type()), &DataType::Int32);
        assert_eq!(physical_type(&DataType::Float64), &DataType::Float64);
    }
}
