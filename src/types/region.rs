//! Fixed country and device vocabularies shared by generation and validation

/// Countries a user can call home
pub const HOME_COUNTRIES: [&str; 7] = ["CA", "US", "UK", "DE", "FR", "IN", "AU"];

/// Regions a nominal login can originate from: every home country plus four more
pub const NOMINAL_REGIONS: [&str; 11] = [
    "CA", "US", "UK", "DE", "FR", "IN", "AU", "BR", "SG", "JP", "MX",
];

/// Countries used only by the improbable-geography anomaly
pub const HIGH_RISK_COUNTRIES: [&str; 6] = ["CN", "RU", "IR", "KP", "NG", "AR"];

/// Number of canonical devices in the shared pool
pub const DEVICE_POOL_SIZE: usize = 10_000;

const DEVICE_PREFIX: &str = "dev_";
const UNREGISTERED_PREFIX: &str = "new_";

/// Canonical id of the `index`-th pool device, e.g. `dev_00042`
pub fn device_id(index: usize) -> String {
    format!("{DEVICE_PREFIX}{index:05}")
}

/// Unregistered variant of a pool device, e.g. `new_dev_00042`
pub fn unregistered_device_id(index: usize) -> String {
    format!("{UNREGISTERED_PREFIX}{}", device_id(index))
}

pub fn is_home_country(code: &str) -> bool {
    HOME_COUNTRIES.contains(&code)
}

pub fn is_high_risk_country(code: &str) -> bool {
    HIGH_RISK_COUNTRIES.contains(&code)
}

/// Any country a login event may legitimately carry
pub fn is_known_country(code: &str) -> bool {
    NOMINAL_REGIONS.contains(&code) || is_high_risk_country(code)
}

pub fn is_unregistered_device(id: &str) -> bool {
    id.strip_prefix(UNREGISTERED_PREFIX)
        .is_some_and(is_pool_device)
}

/// True for `dev_00000` through `dev_09999`
pub fn is_pool_device(id: &str) -> bool {
    id.strip_prefix(DEVICE_PREFIX)
        .filter(|digits| digits.len() == 5 && digits.bytes().all(|b| b.is_ascii_digit()))
        .and_then(|digits| digits.parse::<usize>().ok())
        .is_some_and(|index| index < DEVICE_POOL_SIZE)
}
