//! Access point security flag words.

use bitflags::bitflags;

bitflags! {
    /// `WpaFlags` / `RsnFlags` of an access point (`NM80211ApSecurityFlags`).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ApSecurityFlags: u32 {
        const PAIR_WEP40 = 0x0000_0001;
        const PAIR_WEP104 = 0x0000_0002;
        const PAIR_TKIP = 0x0000_0004;
        const PAIR_CCMP = 0x0000_0008;
        const GROUP_WEP40 = 0x0000_0010;
        const GROUP_WEP104 = 0x0000_0020;
        const GROUP_TKIP = 0x0000_0040;
        const GROUP_CCMP = 0x0000_0080;
        const KEY_MGMT_PSK = 0x0000_0100;
        const KEY_MGMT_802_1X = 0x0000_0200;
        const KEY_MGMT_SAE = 0x0000_0400;
        const KEY_MGMT_OWE = 0x0000_0800;
        const KEY_MGMT_OWE_TM = 0x0000_1000;
        const KEY_MGMT_EAP_SUITE_B_192 = 0x0000_2000;
    }
}

impl ApSecurityFlags {
    /// Combines the WPA and RSN words of an access point.
    pub fn from_ap(wpa: u32, rsn: u32) -> Self {
        Self::from_bits_retain(wpa | rsn)
    }

    pub fn enterprise(self) -> bool {
        self.contains(Self::KEY_MGMT_802_1X)
    }

    pub fn psk(self) -> bool {
        self.contains(Self::KEY_MGMT_PSK)
    }

    pub fn sae(self) -> bool {
        self.contains(Self::KEY_MGMT_SAE)
    }
}
