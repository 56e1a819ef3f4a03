/// An enumeration whose constants can be named in a JSON control request.
///
/// Lookup is case-sensitive against [`ControlEnum::CONSTANTS`].
pub trait ControlEnum: Sized + Copy + Send + Sync + 'static {
    /// Type name reported in coercion errors.
    const TYPE_NAME: &'static str;

    /// Every constant paired with its wire name.
    const CONSTANTS: &'static [(&'static str, Self)];

    fn from_constant(name: &str) -> Option<Self> {
        Self::CONSTANTS
            .iter()
            .find(|(constant, _)| *constant == name)
            .map(|(_, value)| *value)
    }

    fn constant_names() -> Vec<&'static str> {
        Self::CONSTANTS.iter().map(|(name, _)| *name).collect()
    }
}
