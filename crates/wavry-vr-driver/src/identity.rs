use wavry_vr::DeviceClass;

/// Stable identity the host associates with one device instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceIdentity {
    serial_number: String,
    class: DeviceClass,
}

impl DeviceIdentity {
    pub fn new(serial_number: impl Into<String>, class: DeviceClass) -> Self {
        Self {
            serial_number: serial_number.into(),
            class,
        }
    }

    pub fn serial_number(&self) -> &str {
        &self.serial_number
    }

    pub fn class(&self) -> DeviceClass {
        self.class
    }

    pub fn is_hmd(&self) -> bool {
        self.class == DeviceClass::Hmd
    }

    pub fn is_tracking_reference(&self) -> bool {
        self.class == DeviceClass::TrackingReference
    }
}
