//! Provider deployment flavour

string_enum! {
    /// Where the provider instance runs
    #[derive(Default)]
    pub enum GitlabType rejects UnknownType {
        #[default]
        SelfManaged => "self-managed",
        Saas => "saas",
        Dedicated => "dedicated",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse() {
        assert_eq!(GitlabType::parse("saas").unwrap(), GitlabType::Saas);
        assert_eq!(GitlabType::default().as_str(), "self-managed");
        assert!(GitlabType::parse("cloud").is_err());
    }
}
