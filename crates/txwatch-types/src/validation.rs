//! Configuration validation for implementation tables.
//!
//! Each pluggable implementation receives its own raw TOML table. A [`Schema`]
//! lists the required and optional keys of that table with their expected
//! types, and is checked before the implementation is constructed.

use thiserror::Error;

/// Errors that can occur during configuration validation.
#[derive(Debug, Error)]
pub enum ValidationError {
	#[error("Missing required field: {0}")]
	MissingField(String),
	#[error("Invalid value for field '{field}': {message}")]
	InvalidValue { field: String, message: String },
	#[error("Type mismatch for field '{field}': expected {expected}, got {actual}")]
	TypeMismatch {
		field: String,
		expected: String,
		actual: String,
	},
}

/// Expected type of a configuration field.
#[derive(Debug)]
pub enum FieldType {
	String,
	/// Integer with optional inclusive bounds.
	Integer { min: Option<i64>, max: Option<i64> },
	/// String holding an `http://` or `https://` URL.
	Url,
	/// Table whose values are all strings (e.g. extra HTTP headers).
	StringMap,
}

#[derive(Debug)]
pub struct Field {
	pub name: String,
	pub field_type: FieldType,
}

impl Field {
	pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
		Self {
			name: name.into(),
			field_type,
		}
	}

	fn check(&self, value: &toml::Value) -> Result<(), ValidationError> {
		validate_field_type(&self.name, value, &self.field_type)
	}
}

/// Required and optional fields of a TOML table.
#[derive(Debug)]
pub struct Schema {
	pub required: Vec<Field>,
	pub optional: Vec<Field>,
}

impl Schema {
	pub fn new(required: Vec<Field>, optional: Vec<Field>) -> Self {
		Self { required, optional }
	}

	/// Validates a TOML value against this schema.
	///
	/// Unknown keys are ignored.
	pub fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let table = config
			.as_table()
			.ok_or_else(|| ValidationError::TypeMismatch {
				field: "root".to_string(),
				expected: "table".to_string(),
				actual: config.type_str().to_string(),
			})?;

		for field in &self.required {
			let value = table
				.get(&field.name)
				.ok_or_else(|| ValidationError::MissingField(field.name.clone()))?;
			field.check(value)?;
		}

		for field in &self.optional {
			if let Some(value) = table.get(&field.name) {
				field.check(value)?;
			}
		}

		Ok(())
	}
}

fn mismatch(field_name: &str, expected: &str, value: &toml::Value) -> ValidationError {
	ValidationError::TypeMismatch {
		field: field_name.to_string(),
		expected: expected.to_string(),
		actual: value.type_str().to_string(),
	}
}

fn validate_field_type(
	field_name: &str,
	value: &toml::Value,
	expected_type: &FieldType,
) -> Result<(), ValidationError> {
	match expected_type {
		FieldType::String => {
			if !value.is_str() {
				return Err(mismatch(field_name, "string", value));
			}
		},
		FieldType::Integer { min, max } => {
			let int_val = value
				.as_integer()
				.ok_or_else(|| mismatch(field_name, "integer", value))?;

			if let Some(min_val) = min {
				if int_val < *min_val {
					return Err(ValidationError::InvalidValue {
						field: field_name.to_string(),
						message: format!("Value {} is less than minimum {}", int_val, min_val),
					});
				}
			}
			if let Some(max_val) = max {
				if int_val > *max_val {
					return Err(ValidationError::InvalidValue {
						field: field_name.to_string(),
						message: format!("Value {} is greater than maximum {}", int_val, max_val),
					});
				}
			}
		},
		FieldType::Url => {
			let url = value
				.as_str()
				.ok_or_else(|| mismatch(field_name, "string", value))?;
			if !(url.starts_with("http://") || url.starts_with("https://")) {
				return Err(ValidationError::InvalidValue {
					field: field_name.to_string(),
					message: "URL must start with http:// or https://".to_string(),
				});
			}
		},
		FieldType::StringMap => {
			let table = value
				.as_table()
				.ok_or_else(|| mismatch(field_name, "table", value))?;
			for (key, item) in table {
				if !item.is_str() {
					return Err(mismatch(&format!("{}.{}", field_name, key), "string", item));
				}
			}
		},
	}

	Ok(())
}

/// A configuration schema that can validate an implementation's TOML table.
pub trait ConfigSchema: Send + Sync {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError>;
}

#[cfg(test)]
mod tests {
	use super::*;

	fn endpoint_schema() -> Schema {
		Schema::new(
			vec![Field::new("url", FieldType::Url)],
			vec![
				Field::new(
					"chain_id",
					FieldType::Integer {
						min: Some(1),
						max: None,
					},
				),
				Field::new("headers", FieldType::StringMap),
			],
		)
	}

	#[test]
	fn test_valid_table() {
		let config: toml::Value = toml::from_str(
			r#"
url = "http://localhost:8545"
chain_id = 1
[headers]
Authorization = "Bearer abc"
"#,
		)
		.unwrap();
		assert!(endpoint_schema().validate(&config).is_ok());
	}

	#[test]
	fn test_missing_and_bad_fields() {
		let missing: toml::Value = toml::from_str("chain_id = 1").unwrap();
		assert!(matches!(
			endpoint_schema().validate(&missing),
			Err(ValidationError::MissingField(f)) if f == "url"
		));

		let bad_url: toml::Value = toml::from_str(r#"url = "ws://localhost""#).unwrap();
		assert!(matches!(
			endpoint_schema().validate(&bad_url),
			Err(ValidationError::InvalidValue { .. })
		));

		let bad_header: toml::Value = toml::from_str(
			r#"
url = "https://node"
[headers]
X-Retries = 3
"#,
		)
		.unwrap();
		assert!(matches!(
			endpoint_schema().validate(&bad_header),
			Err(ValidationError::TypeMismatch { field, .. }) if field == "headers.X-Retries"
		));
	}
}
