/// An input device as presented to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputDevice {
    /// Host-specific identifier, stable across runs.
    pub id: String,
    pub description: String,
    /// Whether this is the device captured from on `StartRecordingRequest`.
    pub selected: bool,
}
