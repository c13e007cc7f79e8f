//! Static table of supported scope models.

/// Descriptor for one supported scope model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VdsModel {
    /// Vendor name.
    pub vendor: &'static str,
    /// Model name, as it appears in the version reply header.
    pub name: &'static str,
    /// USB iSerialNumber string the model enumerates with.
    pub id: &'static str,
}

/// All models this crate knows how to talk to.
pub const MODELS: &[VdsModel] = &[VdsModel {
    vendor: "Owon",
    name: "VDS2062",
    id: "VDS2062",
}];

/// Looks up a model by the iSerialNumber string reported during discovery.
pub fn find_model(id: &str) -> Option<&'static VdsModel> {
    MODELS.iter().find(|model| model.id == id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_is_exact() {
        assert_eq!(find_model("VDS2062").unwrap().vendor, "Owon");
        assert_eq!(find_model("VDS206"), None);
        assert_eq!(find_model("VDS20620"), None);
    }
}
