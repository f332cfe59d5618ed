/// Arrow schema for the `proposals` destination table.
pub mod proposals {
    use arrow::datatypes::{DataType, Field, Schema};
    use std::sync::Arc;

    pub const TABLE: &str = "proposals";

    /// Separator used when list columns are flattened to text.
    pub const NAME_SEPARATOR: &str = "、";

    /// Schema for enriched proposal rows with a `dim`-wide embedding column.
    pub fn schema(dim: i32) -> Schema {
        Schema::new(vec![
            Field::new("category", DataType::Utf8, false),
            Field::new("content", DataType::Utf8, false),
            Field::new("action", DataType::Utf8, false),
            Field::new("proposer", DataType::Utf8, true),
            Field::new("co_signers", DataType::Utf8, true),
            Field::new("cost", DataType::UInt64, true),
            Field::new("frozen", DataType::UInt64, true),
            Field::new("deleted", DataType::UInt64, true),
            Field::new("added", DataType::UInt64, true),
            Field::new("remarks", DataType::Utf8, true),
            Field::new("committee", DataType::Utf8, false),
            Field::new("vector", vector_type(dim), true),
        ])
    }

    pub fn vector_type(dim: i32) -> DataType {
        DataType::FixedSizeList(Arc::new(Field::new("item", DataType::Float32, true)), dim)
    }
}

#[cfg(test)]
mod tests {
    use super::proposals;
    use arrow::datatypes::DataType;

    #[test]
    fn proposals_schema_has_expected_fields() {
        let schema = proposals::schema(1536);
        assert_eq!(schema.fields().len(), 12);
        assert!(schema.field_with_name("co_signers").is_ok());
        assert!(!schema.field_with_name("content").unwrap().is_nullable());
    }

    #[test]
    fn vector_column_is_fixed_width() {
        let schema = proposals::schema(8);
        let field = schema.field_with_name("vector").unwrap();
        assert!(field.is_nullable());
        assert!(matches!(field.data_type(), DataType::FixedSizeList(_, 8)));
    }
}
