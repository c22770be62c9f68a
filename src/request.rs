use crate::error::RequestError;
use crate::fields::{validate_params, LocationType, RequestParams, DEFAULT_FIELDS};
use crate::geo::{compute_bounds, GeoPoint};

/// Everything needed to build one `/sensors` request for the search area.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorQuery {
    pub center: GeoPoint,
    pub radius_km: f64,
    pub fields: Vec<String>,
    pub location_type: LocationType,
    pub max_age: Option<u64>,
    pub modified_since: Option<u64>,
    pub show_only: Option<String>,
    pub read_keys: Option<String>,
}

impl SensorQuery {
    pub fn new(center: GeoPoint, radius_km: f64) -> Self {
        Self {
            center,
            radius_km,
            fields: DEFAULT_FIELDS.iter().map(|field| field.to_string()).collect(),
            location_type: LocationType::Outside,
            max_age: None,
            modified_since: None,
            show_only: None,
            read_keys: None,
        }
    }

    pub fn to_params(&self) -> Result<RequestParams, RequestError> {
        let bounds = compute_bounds(self.center, self.radius_km)?;

        let mut params = RequestParams::new();
        params.insert("fields".to_string(), self.fields.join(","));
        params.insert("location_type".to_string(), self.location_type.to_string());
        bounds.append_params(&mut params);

        if let Some(max_age) = self.max_age {
            params.insert("max_age".to_string(), max_age.to_string());
        }
        if let Some(modified_since) = self.modified_since {
            params.insert("modified_since".to_string(), modified_since.to_string());
        }
        if let Some(show_only) = self.show_only.as_deref().filter(|v| !v.is_empty()) {
            params.insert("show_only".to_string(), show_only.to_string());
        }
        if let Some(read_keys) = self.read_keys.as_deref().filter(|v| !v.is_empty()) {
            params.insert("read_keys".to_string(), read_keys.to_string());
        }

        validate_params(&params)?;
        Ok(params)
    }
}
