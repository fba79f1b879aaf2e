use async_trait::async_trait;
use tracing::debug;

use crate::{
    ApiResponse, Authenticator, FlickrClient, FlickrError, OAuthToken, Permission, ResponseFormat,
    UploadRequest, UploadedPhoto,
};

/// Capability that sends one photo on behalf of an authorized user.
#[async_trait]
pub trait PhotoUploader: Send + Sync {
    async fn upload(
        &self,
        token: &OAuthToken,
        request: &UploadRequest,
        format: ResponseFormat,
    ) -> Result<ApiResponse, FlickrError>;
}

#[async_trait]
impl PhotoUploader for FlickrClient {
    async fn upload(
        &self,
        token: &OAuthToken,
        request: &UploadRequest,
        format: ResponseFormat,
    ) -> Result<ApiResponse, FlickrError> {
        self.clone()
            .with_token(token.clone())
            .upload(request, format)
            .await
    }
}

/// Authorize with `write` permission, then upload `request` once.
///
/// Errors from either step are returned as-is; if authorization fails nothing is uploaded.
pub async fn run<A, U>(
    authenticator: &A,
    uploader: &U,
    request: &UploadRequest,
) -> Result<ApiResponse, FlickrError>
where
    A: Authenticator + ?Sized,
    U: PhotoUploader + ?Sized,
{
    let token = authenticator.authenticate(Permission::Write).await?;
    debug!(user = %token.user_nsid, "authenticated");

    let response = uploader
        .upload(&token, request, ResponseFormat::Etree)
        .await?;

    if let Ok(photo) = UploadedPhoto::try_from(&response) {
        debug!(photo_id = %photo.photo_id, "upload complete");
    }
    Ok(response)
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::xml::XmlElement;

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Authenticate(Permission),
        Upload(UploadRequest, ResponseFormat, String),
    }

    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<Call>>,
    }

    impl Recorder {
        fn push(&self, call: Call) {
            self.calls.lock().unwrap().push(call);
        }

        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }
    }

    struct FakeAuth<'a> {
        recorder: &'a Recorder,
        fail: bool,
    }

    #[async_trait]
    impl Authenticator for FakeAuth<'_> {
        async fn authenticate(&self, perms: Permission) -> Result<OAuthToken, FlickrError> {
            self.recorder.push(Call::Authenticate(perms));
            if self.fail {
                return Err(FlickrError::OAuth("user denied".into()));
            }
            Ok(OAuthToken {
                token: "tok".into(),
                token_secret: "secret".into(),
                perms,
                user_nsid: "1@N00".into(),
                username: "someone".into(),
                fullname: String::new(),
            })
        }
    }

    struct FakeUploader<'a> {
        recorder: &'a Recorder,
        fail: bool,
    }

    #[async_trait]
    impl PhotoUploader for FakeUploader<'_> {
        async fn upload(
            &self,
            token: &OAuthToken,
            request: &UploadRequest,
            format: ResponseFormat,
        ) -> Result<ApiResponse, FlickrError> {
            self.recorder
                .push(Call::Upload(request.clone(), format, token.token.clone()));
            if self.fail {
                return Err(FlickrError::Api {
                    code: 3,
                    message: "General upload failure".into(),
                });
            }
            Ok(ApiResponse::Etree(XmlElement::parse(
                r#"<rsp stat="ok"><photoid>42</photoid></rsp>"#,
            )?))
        }
    }

    fn sunset() -> UploadRequest {
        UploadRequest {
            file_path: "photo.jpg".into(),
            title: "Sunset".into(),
            description: "A sunset over the bay".into(),
            tags: "sunset,bay,evening".into(),
        }
    }

    #[tokio::test]
    async fn authenticates_for_write_then_uploads_once() {
        let recorder = Recorder::default();
        let auth = FakeAuth { recorder: &recorder, fail: false };
        let uploader = FakeUploader { recorder: &recorder, fail: false };

        let response = run(&auth, &uploader, &sunset()).await.unwrap();

        assert_eq!(
            recorder.calls(),
            vec![
                Call::Authenticate(Permission::Write),
                Call::Upload(sunset(), ResponseFormat::Etree, "tok".into()),
            ]
        );
        assert_eq!(UploadedPhoto::try_from(&response).unwrap().photo_id, "42");
    }

    #[tokio::test]
    async fn auth_failure_skips_upload() {
        let recorder = Recorder::default();
        let auth = FakeAuth { recorder: &recorder, fail: true };
        let uploader = FakeUploader { recorder: &recorder, fail: false };

        let err = run(&auth, &uploader, &sunset()).await.unwrap_err();

        assert!(matches!(err, FlickrError::OAuth(ref m) if m == "user denied"));
        assert_eq!(recorder.calls(), vec![Call::Authenticate(Permission::Write)]);
    }

    #[tokio::test]
    async fn upload_failure_propagates_unchanged() {
        let recorder = Recorder::default();
        let auth = FakeAuth { recorder: &recorder, fail: false };
        let uploader = FakeUploader { recorder: &recorder, fail: true };

        let err = run(&auth, &uploader, &sunset()).await.unwrap_err();

        match err {
            FlickrError::Api { code, message } => {
                assert_eq!(code, 3);
                assert_eq!(message, "General upload failure");
            }
            other => panic!("expected Api error, got {other:?}"),
        }
        assert_eq!(recorder.calls().len(), 2);
    }

    #[tokio::test]
    async fn metadata_reaches_uploader_unmodified() {
        let recorder = Recorder::default();
        let auth = FakeAuth { recorder: &recorder, fail: false };
        let uploader = FakeUploader { recorder: &recorder, fail: false };
        let request = UploadRequest {
            file_path: "dir with space/ünïcode.png".into(),
            title: "  padded  ".into(),
            description: "".into(),
            tags: "\"quoted tag\" other".into(),
        };

        run(&auth, &uploader, &request).await.unwrap();

        match &recorder.calls()[1] {
            Call::Upload(seen, _, _) => assert_eq!(seen, &request),
            other => panic!("expected upload, got {other:?}"),
        }
    }
}
