//! Journal name abbreviation
//!
//! Maps full journal names (as they come back from DOI metadata services) to
//! their ISO4-style abbreviations.

use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashMap;

lazy_static! {
    /// Dictionary mapping full journal names to abbreviations.
    ///
    /// Keys omit a leading "The"; [`abbreviate_journal`] strips it before lookup.
    static ref ABBREVIATIONS: HashMap<&'static str, &'static str> = {
        let mut m = HashMap::new();

        // Atmospheric and Earth sciences
        m.insert("Aerosol Science and Technology", "Aerosol Sci. Technol.");
        m.insert("Atmospheric Chemistry and Physics", "Atmos. Chem. Phys.");
        m.insert("Atmospheric Chemistry and Physics Discussions", "Atmos. Chem. Phys. Discuss.");
        m.insert("Atmospheric Environment", "Atmos. Environ.");
        m.insert("Atmospheric Measurement Techniques", "Atmos. Meas. Tech.");
        m.insert("Atmospheric Measurement Techniques Discussions", "Atmos. Meas. Tech. Discuss.");
        m.insert("Atmospheric Research", "Atmos. Res.");
        m.insert("Climatic Change", "Clim. Change");
        m.insert("Earth-Science Reviews", "Earth Sci. Rev.");
        m.insert("Geophysical Research Letters", "Geophys. Res. Lett.");
        m.insert("Geoscientific Model Development", "Geosci. Model Dev.");
        m.insert("Geoscientific Model Development Discussions", "Geosci. Model Dev. Discuss.");
        m.insert("Journal of Applied Meteorology and Climatology", "J. Appl. Meterol. Climatol.");
        m.insert("Journal of Geophysical Research: Atmospheres", "J. Geophys. Res. Atmos.");
        m.insert("Monthly Weather Review", "Mon. Weather Rev.");
        m.insert("Remote Sensing of Environment", "Remote Sens. Environ.");
        m.insert("{IEEE} Transactions on Geoscience and Remote Sensing", "IEEE Trans. Geosci. Remote Sens.");

        // Chemistry and physics
        m.insert("Applied Optics", "Appl. Opt.");
        m.insert("Chemical Reviews", "Chem. Rev.");
        m.insert("Environmental Pollution", "Environ. Pollut.");
        m.insert("Environmental Science {\\&} Technology", "Environ. Sci. Technol.");
        m.insert("Faraday Discussions", "Faraday Discuss.");
        m.insert("Journal of Chemical Education", "J. Chem. Educ.");
        m.insert("Journal of Chemical Physics", "J. Chem. Phys");
        m.insert("Journal of Physical Chemistry A", "J. Phys. Chem. A");
        m.insert("Journal of Quantitative Spectroscopy and Radiative Transfer", "J. Quant. Spectrosc. Radiat. Transfer");
        m.insert("Physica D: Nonlinear Phenomena", "Physica D");
        m.insert("Proceedings of the {IEEE}", "Proc. IEEE");

        // General science
        m.insert("American Journal of Physical Anthropology", "Am. J. Phys. Anthropol.");
        m.insert("Nature", "Nature");
        m.insert("Nature Chemistry", "Nat. Chem");
        m.insert("Nature Climate Change", "Nat. Clim. Change");
        m.insert("Nature Communications", "Nat. Commun.");
        m.insert("Nature Geoscience", "Nat. Geosci.");
        m.insert("Plant and Soil", "Plant Soil");
        m.insert("Proceedings of the National Academy of Sciences", "PNAS");
        m.insert("Science", "Science");
        m.insert("{PLoS} Biology", "PLoS Biol.");

        m
    };

    static ref LEADING_THE: Regex = Regex::new(r"^(?:The|THE|the)\s+").unwrap();
}

/// Abbreviate a journal name, returning it unchanged when it is not known
pub fn abbreviate_journal(name: &str) -> String {
    let trimmed = LEADING_THE.replace(name.trim(), "");
    ABBREVIATIONS
        .get(trimmed.as_ref())
        .map(|abbrev| abbrev.to_string())
        .unwrap_or_else(|| name.to_string())
}

/// Check whether a journal name has a known abbreviation
pub fn has_abbreviation(name: &str) -> bool {
    let trimmed = LEADING_THE.replace(name.trim(), "");
    ABBREVIATIONS.contains_key(trimmed.as_ref())
}
