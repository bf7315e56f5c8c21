//! Riot API host routing.
//!
//! account-v1 and match-v5 live on the three regional clusters, summoner-v4
//! on the per-platform hosts. Region codes are the short ones players use
//! (`euw`, `na`, `kr`, …); unknown codes fall back to Europe.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionalRoute {
    Europe,
    Americas,
    Asia,
}

impl RegionalRoute {
    pub fn host(&self) -> &'static str {
        match self {
            RegionalRoute::Europe => "europe",
            RegionalRoute::Americas => "americas",
            RegionalRoute::Asia => "asia",
        }
    }

    pub fn for_region(region: &str) -> Self {
        match region.trim().to_lowercase().as_str() {
            "na" | "br" | "lan" | "las" | "oc" => RegionalRoute::Americas,
            "kr" | "jp" => RegionalRoute::Asia,
            _ => RegionalRoute::Europe,
        }
    }
}

/// Platform host for a short region code, e.g. `euw` → `euw1`.
pub fn platform_host(region: &str) -> String {
    let region = region.trim().to_lowercase();
    let host = match region.as_str() {
        "euw" => "euw1",
        "eune" => "eun1",
        "tr" => "tr1",
        "ru" => "ru",
        "na" => "na1",
        "br" => "br1",
        "lan" => "la1",
        "las" => "la2",
        "oc" => "oc1",
        "kr" => "kr",
        "jp" => "jp1",
        _ => return region,
    };
    host.to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn regional_route_groups_platforms() {
        assert_eq!(RegionalRoute::for_region("EUW"), RegionalRoute::Europe);
        assert_eq!(RegionalRoute::for_region("eune"), RegionalRoute::Europe);
        assert_eq!(RegionalRoute::for_region("lan"), RegionalRoute::Americas);
        assert_eq!(RegionalRoute::for_region("jp"), RegionalRoute::Asia);
        assert_eq!(RegionalRoute::for_region("somewhere"), RegionalRoute::Europe);
    }

    #[test]
    fn platform_host_passes_unknown_codes_through() {
        assert_eq!(platform_host("euw"), "euw1");
        assert_eq!(platform_host(" KR "), "kr");
        assert_eq!(platform_host("pbe1"), "pbe1");
    }
}
