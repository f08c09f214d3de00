//! Known private equity firm registry helpers
//!
//! The registry itself is a flat list of firm names persisted by the store.
//! This module holds the built-in seed list and the case-insensitive set
//! operations the orchestrator needs around it.

use crate::company::CompanyRecord;
use std::collections::HashSet;
use tracing::debug;

/// Seed list used when the registry file is missing or unreadable.
pub const DEFAULT_PE_FIRMS: &[&str] = &[
    "Addor Capital", "Affinity Equity Partners", "Archer Capital", "Axiom Asia", "BGH Capital",
    "Boyu Capital", "CBC Group", "Centurium Capital", "China Chengtong Holdings Group",
    "China Media Capital", "China Merchants Capital", "China Reform Fund Management",
    "CITIC Capital", "CoStone Capital", "Cowin Capital", "CPE", "DCP Capital",
    "Dymon Asia Private Equity", "Ekuinas", "FountainVest Partners", "Hillhouse Capital Group",
    "Hony Capital", "Hopu Investment Management", "JAFCO", "JIC Capital", "Leopard Capital LP",
    "Mekong Capital", "MBK Partners", "Northstar Group", "Oriza Holdings",
    "Pacific Equity Partners", "PAG", "Primavera Capital Group", "Quadria Capital",
    "Quadrant Private Equity", "RRJ Capital", "Seavi Advent", "Tiantu Capital",
    "Tybourne Capital Management", "Yunfeng Capital", "Zhongzhi Capital", "ZWC Partners",
    "3G Capital", "ABS Capital", "Adams Street Partners", "Advent International",
    "AEA Investors", "American Securities", "Angelo, Gordon & Co.", "Apollo Global Management",
    "Ares Management", "Arlington Capital Partners", "Auldbrass Partners",
    "Avenue Capital Group", "Avista Capital Partners", "Bain Capital", "BDT & MSD Partners",
    "Berkshire Partners", "Blackstone Group", "Blue Owl Capital", "Blum Capital",
    "Brentwood Associates", "Bruckmann, Rosser, Sherrill & Co.", "Brynwood Partners",
    "CapitalG", "Carlyle Group", "Castle Harlan", "CCMP Capital", "Centerbridge Partners",
    "Cerberus Capital Management", "Charlesbank Capital Partners", "Chicago Growth Partners",
    "CI Capital Partners", "CIVC Partners", "Clayton, Dubilier & Rice", "Clearlake Capital",
    "Colony Capital", "Court Square Capital Partners", "Crescent Capital Group",
    "CrossHarbor Capital Partners", "Crossroads Group", "Cypress Group",
    "Defoe Fournier & Cie.", "Diamond Castle Holdings", "DLJ Merchant Banking Partners",
    "EIG Global Energy Partners", "Elevation Partners", "EnCap Investments",
    "Energy Capital Partners", "Fenway Partners", "First Reserve Corporation",
    "Forstmann Little & Company", "Fortress Investment Group", "Fox Paine & Company",
    "Francisco Partners", "Freeman Spogli & Co.", "Fremont Group", "Friedman Fleischer & Lowe",
    "Frontenac Company", "General Atlantic", "Genstar Capital", "GI Partners",
    "Golden Gate Capital Partners", "Goldman Sachs Capital Partners", "Gores Group",
    "GP Investimentos", "GTCR", "H.I.G. Capital", "Hamilton Lane",
    "Harbert Management Corporation", "HarbourVest Partners", "Harvest Partners",
    "Heartland Industrial Partners", "Hellman & Friedman", "Highbridge Capital Management",
    "Highland Capital Management", "HM Capital Partners", "HPS Investment Partners",
    "InterMedia Partners", "Irving Place Capital", "J.H. Whitney & Company",
    "J.W. Childs Associates", "JC Flowers", "JLL Partners", "Jordan Company",
    "Kelso & Company", "Khosla Ventures", "Kinderhook Industries", "Kleiner Perkins",
    "Kohlberg & Company", "KPS Capital Partners", "L Catterton", "Landmark Partners",
    "Lee Equity Partners", "Leeds Equity Partners", "Leonard Green & Partners",
    "Lexington Partners", "Lightyear Capital", "Lincolnshire Management",
    "Lindsay Goldberg Bessemer", "Littlejohn & Co.", "Lone Star Funds",
    "Lovell Minnick Partners", "LRG Capital Funds", "Lux Capital", "Madison Dearborn Partners",
    "MatlinPatterson Global Advisors", "Metalmark Capital", "MidOcean Partners",
    "Morgan Stanley Private Equity", "New Mountain Capital", "NRDC Equity Partners",
    "Oak Hill Capital Partners", "Oak Investment Partners", "Olympus Partners",
    "One Equity Partners", "Onex Corporation", "Pamlico Capital", "Pathway Capital Management",
    "Platinum Equity", "Providence Equity Partners", "Quadrangle Group", "Redpoint Ventures",
    "Rhône Group", "Ripplewood Holdings", "Riverside Partners", "Riverstone Holdings",
    "Roark Capital Group", "RPX Corporation", "Sentinel Capital Partners",
    "Silver Lake Partners", "Stonepeak", "Summit Partners", "Sun Capital Partners",
    "Sycamore Partners", "Symphony Technology Group", "TA Associates", "Tavistock Group",
    "TCV", "Thayer Hidden Creek", "Thoma Bravo", "Thoma Cressey Bravo",
    "Thomas H. Lee Partners", "Tiger Global Management", "TowerBrook Capital Partners",
    "TPG Capital", "Trilantic Capital Partners", "Trivest", "TSG Consumer Partners",
    "Värde Partners", "Veritas Capital", "Veronis Suhler Stevenson", "Vestar Capital Partners",
    "Vista Equity Partners", "Vivo Capital", "Vulcan Capital Management", "Warburg Pincus",
    "Warwick Energy Group", "Welsh, Carson, Anderson & Stowe", "Wesray Capital Corporation",
    "Weston Presidio", "Willis Stein & Partners", "Wind Point Partners", "WL Ross & Co.",
    "Yucaipa Cos.", "Zelnick Media Capital", "3i", "Actis", "AlpInvest Partners",
    "Altor Equity Partners", "Apax Partners", "Arcapita", "Ardian",
    "Argentum Fondsinvesteringer", "Axcel", "Aurelius Group", "Baring Vostok Capital Partners",
    "BC Partners", "BIP Investment Partners", "Bridgepoint Capital", "Butler Capital Partners",
    "CapMan", "Capital Dynamics", "Capvis", "Charterhouse Capital Partners", "Cinven",
    "Close Brothers Group", "Coller Capital", "Conquest Asset Management",
    "Copenhagen Infrastructure Partners", "C.W. Obel", "CVC Capital Partners",
    "Doughty Hanson & Co", "DST Global", "Dubai International Capital", "Duke Street Capital",
    "EMVest Asset Management", "EQT AB", "Eurazeo", "Ferd", "Fondinvest Capital",
    "GFH Capital", "GIMV", "Graphite Capital", "GK Investment", "HgCapital", "ICT Group",
    "Idinvest Partners", "IFD Kapital Group", "IK Investment Partners", "Infinity Group",
    "Intermediate Capital Group", "Investcorp", "Jadwa Investment", "Kennet Partners",
    "Kistefos", "LGT Capital Partners", "Livingbridge", "M. Goldschmidt Holding",
    "Marfin Investment Group", "MerchantBridge", "Meyer Bergman", "Mid Europa Partners",
    "Mubadala Investment Company", "Mutares", "Nordic Capital", "Norfund", "OpCapita",
    "PAI Partners", "Pantheon Ventures", "Partners Group", "Permira",
    "Phoenix Equity Partners", "Ratos", "Silverfleet Capital Partners", "SL Capital Partners",
    "Sofina", "SVG Capital", "Terra Firma Capital Partners", "Unbound Group",
    "Vitruvian Partners",
];

pub fn default_firms() -> Vec<String> {
    DEFAULT_PE_FIRMS.iter().map(|s| s.to_string()).collect()
}

/// Case-insensitive membership test.
pub fn contains_ignore_case(registry: &[String], name: &str) -> bool {
    let needle = name.trim().to_lowercase();
    registry.iter().any(|known| known.trim().to_lowercase() == needle)
}

/// Deduplicate names case-insensitively, keeping the first spelling seen and
/// the original order. Blank names are dropped.
pub fn dedup_ignore_case<'a, I>(names: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a String>,
{
    let mut seen = HashSet::new();
    let mut unique = Vec::new();
    for name in names {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            continue;
        }
        if seen.insert(trimmed.to_lowercase()) {
            unique.push(trimmed.to_string());
        }
    }
    unique
}

/// Every PE owner named by any record, deduplicated case-insensitively.
pub fn owner_names(records: &[CompanyRecord]) -> Vec<String> {
    dedup_ignore_case(records.iter().flat_map(|r| r.pe_owner_names.iter()))
}

/// Owner names not already present in `snapshot`.
pub fn new_discoveries(snapshot: &[String], records: &[CompanyRecord]) -> Vec<String> {
    let discovered: Vec<String> = owner_names(records)
        .into_iter()
        .filter(|name| !contains_ignore_case(snapshot, name))
        .collect();
    debug!("{} newly discovered PE firm(s)", discovered.len());
    discovered
}

/// Union `additions` into `registry`. Returns how many names were added.
pub fn union_into(registry: &mut Vec<String>, additions: &[String]) -> usize {
    let mut added = 0;
    for name in dedup_ignore_case(additions.iter()) {
        if !contains_ignore_case(registry, &name) {
            registry.push(name);
            added += 1;
        }
    }
    added
}
