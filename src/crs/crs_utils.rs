use anyhow::anyhow;

pub type EpsgCode = u32;

pub fn epsg_code_to_authority_string(code: EpsgCode) -> String {
    format!("EPSG:{}", code)
}

/// Extract the EPSG code from a CRS identifier such as `EPSG:4326`,
/// `urn:ogc:def:crs:EPSG::4326` or `urn:ogc:def:crs:OGC:1.3:CRS84`.
pub fn epsg_code_from_crs_name(name: &str) -> anyhow::Result<EpsgCode> {
    if name.ends_with("CRS84") {
        return Ok(4326);
    }
    let (authority, code) = name
        .rsplit_once(':')
        .ok_or_else(|| anyhow!("'{}' is not an authority:code CRS identifier", name))?;
    if !authority.to_ascii_uppercase().contains("EPSG") {
        return Err(anyhow!("CRS '{}' is not an EPSG CRS", name));
    }
    code.parse()
        .map_err(|err| anyhow!("Could not parse EPSG code from '{}', {}", name, err))
}

/// Projection from one EPSG CRS to another, with x/y in easting/northing (lon/lat) order.
pub fn projection_between(from: EpsgCode, to: EpsgCode) -> anyhow::Result<proj::Proj> {
    proj::Proj::new_known_crs(
        &epsg_code_to_authority_string(from),
        &epsg_code_to_authority_string(to),
        None,
    )
    .map_err(|err| {
        anyhow!(
            "Could not create projection from {} to {}, {}",
            epsg_code_to_authority_string(from),
            epsg_code_to_authority_string(to),
            err
        )
    })
}
