use crate::config::StageConf;
use crate::relay::{relay, BridgedSink, DEFAULT_RELAY_CAPACITY};
use crate::stage::{Sink, Source};
use crate::{PipeError, PipeErrorKind, PipeResult};
use log::error;
use s3::bucket::Bucket;
use s3::creds::Credentials;
use s3::region::Region;
use std::io;
use std::thread;

const DEFAULT_REGION: &str = "us-east-1";

/// Create a source streaming the object named by the `filename` config key out of the `bucket`
/// config key. Credentials come from the environment (`AWS_ACCESS_KEY_ID` and friends), an
/// `endpoint` key targets S3 compatible stores, `region` defaults to `us-east-1`.
pub fn new_source(conf: &StageConf) -> PipeResult<Source> {
    let (bucket, key) = build_bucket(conf)?;
    let (mut writer, reader) = relay(DEFAULT_RELAY_CAPACITY);
    thread::spawn(move || {
        match bucket.get_object_to_writer(&key, &mut writer) {
            Ok(_) => writer.finish(),
            Err(e) => {
                error!("downloading {} failed: {}", key, e);
                writer.fail(io::Error::new(io::ErrorKind::Other, e.to_string()));
            }
        }
    });
    Ok(Box::new(reader))
}

/// Create a sink uploading the stream as the object named by the `filename` config key into the
/// `bucket` config key, using a streamed multipart upload. Same credential and endpoint handling
/// as the source.
pub fn new_sink(conf: &StageConf) -> PipeResult<Box<dyn Sink>> {
    let (bucket, key) = build_bucket(conf)?;
    let (writer, mut reader) = relay(DEFAULT_RELAY_CAPACITY);
    let worker = thread::spawn(move || {
        match bucket.put_object_stream(&mut reader, &key) {
            Ok(_) => Ok(()),
            Err(e) => Err(io::Error::new(io::ErrorKind::Other, e.to_string())),
        }
    });
    Ok(Box::new(BridgedSink::new(writer, worker)))
}

fn build_bucket(conf: &StageConf) -> PipeResult<(Bucket, String)> {
    let name = conf.get("bucket").map(String::as_str).unwrap_or("");
    if name.is_empty() {
        return Err(PipeError::parameter("bucket"));
    }
    let key = conf.get("filename").map(String::as_str).unwrap_or("");
    if key.is_empty() {
        return Err(PipeError::parameter("filename"));
    }

    let region_name = conf
        .get("region")
        .map(String::as_str)
        .unwrap_or(DEFAULT_REGION)
        .to_string();
    let region = match conf.get("endpoint").map(String::as_str) {
        Some(endpoint) if !endpoint.is_empty() => Region::Custom {
            region: region_name,
            endpoint: endpoint.to_string(),
        },
        _ => region_name.parse().map_err(|e| {
            PipeError::new_msg(
                PipeErrorKind::Parameter("region".to_string()),
                format!("invalid region {}: {}", region_name, e),
            )
        })?,
    };

    let credentials = Credentials::default().map_err(|e| {
        PipeError::new_msg(
            PipeErrorKind::Parameter("bucket".to_string()),
            format!("couldn't load credentials: {}", e),
        )
    })?;
    let bucket = Bucket::new(name, region, credentials).map_err(|e| {
        PipeError::new_msg(
            PipeErrorKind::Parameter("bucket".to_string()),
            format!("couldn't open bucket {}: {}", name, e),
        )
    })?;
    Ok((bucket, key.to_string()))
}

#[cfg(test)]
mod tests {
    use super::{new_sink, new_source};
    use crate::config::StageConf;

    fn conf(pairs: &[(&str, &str)]) -> StageConf {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn bucket_and_filename_are_required() {
        assert!(new_source(&StageConf::new()).is_err());
        assert!(new_sink(&StageConf::new()).is_err());
        assert!(new_source(&conf(&[("bucket", "backups")])).is_err());
        assert!(new_sink(&conf(&[("filename", "dump.tar")])).is_err());
    }
}
