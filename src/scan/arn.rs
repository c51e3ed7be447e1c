//! ARN parsing for tag-discovery implementations.
//!
//! Tagging indexes return ARNs; these helpers split out the service and
//! resource type so records can be grouped into [`ServiceResources`].

use serde_json::json;

use crate::models::{RawRecord, ServiceResources, Tag};

/// Service, resource type and full ARN of one resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArnParts<'a> {
    pub arn: &'a str,
    pub service: &'a str,
    pub resource_type: &'a str,
}

impl<'a> ArnParts<'a> {
    /// Parses `arn:partition:service:region:account:type/id` and
    /// `...:type:id` forms. Returns `None` for anything shorter.
    pub fn parse(arn: &'a str) -> Option<Self> {
        let mut parts = arn.splitn(6, ':');
        if parts.next()? != "arn" {
            return None;
        }
        let _partition = parts.next()?;
        let service = parts.next()?;
        let _region = parts.next()?;
        let _account = parts.next()?;
        let resource = parts.next()?;
        if service.is_empty() {
            return None;
        }

        let resource_type = resource
            .split(['/', ':'])
            .next()
            .unwrap_or(resource);
        Some(Self {
            arn,
            service,
            resource_type,
        })
    }

    /// `service:type`, e.g. `ec2:instance`.
    pub fn qualified_type(&self) -> String {
        format!("{}:{}", self.service, self.resource_type)
    }

    /// Resource identifier embedded in the ARN.
    ///
    /// S3 buckets use the name after `:::`; load balancers keep their
    /// `type/name/id` suffix and target groups `name/id`; everything else
    /// uses the last `/` or `:` segment.
    pub fn resource_id(&self) -> Option<&'a str> {
        let arn = self.arn;
        match (self.service, self.resource_type) {
            ("s3", _) => arn.split_once(":::").map(|(_, name)| name),
            ("elasticloadbalancing", "loadbalancer") => split_suffix(arn, 3),
            ("elasticloadbalancing", "targetgroup") => split_suffix(arn, 2),
            _ if arn.contains('/') => arn.rsplit('/').next(),
            _ => arn.rsplit(':').next(),
        }
    }
}

/// Last `segments` `/`-separated pieces after the first `/`.
fn split_suffix(arn: &str, segments: usize) -> Option<&str> {
    let (_, rest) = arn.split_once('/')?;
    (rest.split('/').count() >= segments).then_some(rest)
}

/// Builds the record stored for one tagged resource.
pub fn tagged_record(parts: &ArnParts<'_>, region: &str, tags: &[Tag]) -> RawRecord {
    json!({
        "ResourceARN": parts.arn,
        "ResourceId": parts.resource_id(),
        "ResourceType": parts.qualified_type(),
        "Region": region,
        "Tags": tags,
        "Service": parts.service,
    })
}

/// Groups `(arn, tags)` pairs by service and resource type.
///
/// Unparseable ARNs are skipped.
pub fn group_tagged_resources<'a, I>(region: &str, resources: I) -> ServiceResources
where
    I: IntoIterator<Item = (&'a str, &'a [Tag])>,
{
    let mut grouped = ServiceResources::new();
    for (arn, tags) in resources {
        let Some(parts) = ArnParts::parse(arn) else {
            continue;
        };
        grouped
            .entry(parts.service.to_string())
            .or_default()
            .entry(parts.resource_type.to_string())
            .or_default()
            .push(tagged_record(&parts, region, tags));
    }
    grouped
}
